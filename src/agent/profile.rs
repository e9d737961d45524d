//! Role profiles and the built-in role library
//!
//! A profile is the reusable description of a participant: who it is, what it
//! is told, and which catalog tools it may call.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::{ConclaveError, Result};

/// Named, immutable description of a participant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleProfile {
    name: String,
    #[serde(default)]
    description: String,
    instructions: String,
    #[serde(default)]
    tools: Vec<String>,
}

impl RoleProfile {
    pub fn new(name: impl Into<String>, instructions: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            instructions: instructions.into(),
            tools: Vec::new(),
        }
    }

    /// One-line responsibility summary, used when a leader introduces its team
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Catalog tool names this role may call, in order
    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    pub fn tools(&self) -> &[String] {
        &self.tools
    }

    /// Fill `{key}` placeholders; unknown placeholders are left untouched.
    ///
    /// Substitution is a single pass, values are never expanded again.
    pub fn render(&self, vars: &HashMap<String, String>) -> String {
        let mut out = String::with_capacity(self.instructions.len());
        let mut rest = self.instructions.as_str();
        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let tail = &rest[open..];
            let value = tail
                .find('}')
                .and_then(|close| vars.get(&tail[1..close]).map(|value| (close, value)));
            match value {
                Some((close, value)) => {
                    out.push_str(value);
                    rest = &tail[close + 1..];
                }
                None => {
                    out.push('{');
                    rest = &tail[1..];
                }
            }
        }
        out.push_str(rest);
        out
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ConclaveError::config("role profile has an empty name"));
        }
        if self.name.contains(['[', ']', '\n']) {
            return Err(ConclaveError::config(format!(
                "role name '{}' may not contain brackets or newlines",
                self.name
            )));
        }
        Ok(())
    }
}

/// Where a participant's profile comes from
#[derive(Debug, Clone, PartialEq)]
pub enum RoleSource {
    /// Look the role up in a library by name
    Library(String),
    /// Use this profile as given
    Inline(RoleProfile),
}

impl RoleSource {
    pub fn library(name: impl Into<String>) -> Self {
        RoleSource::Library(name.into())
    }

    /// Resolve against a library; unknown names are a configuration error
    pub fn resolve(&self, library: &RoleLibrary) -> Result<RoleProfile> {
        let profile = match self {
            RoleSource::Library(name) => library.get(name).cloned().ok_or_else(|| {
                ConclaveError::config(format!(
                    "unknown role '{}' (known: {})",
                    name,
                    library.names().join(", ")
                ))
            })?,
            RoleSource::Inline(profile) => profile.clone(),
        };
        profile.validate()?;
        Ok(profile)
    }
}

impl From<RoleProfile> for RoleSource {
    fn from(profile: RoleProfile) -> Self {
        RoleSource::Inline(profile)
    }
}

/// Profiles addressable by name
#[derive(Debug, Clone, Default)]
pub struct RoleLibrary {
    roles: HashMap<String, RoleProfile>,
}

#[derive(Deserialize)]
struct LibraryFile {
    #[serde(default)]
    roles: Vec<RoleProfile>,
}

impl RoleLibrary {
    /// An empty library
    pub fn new() -> Self {
        Self::default()
    }

    /// The roles shipped with the crate
    pub fn builtin() -> Self {
        let mut library = Self::new();
        for profile in builtin_profiles() {
            library.insert(profile);
        }
        library
    }

    /// Parse `[[roles]]` tables from TOML
    pub fn from_toml(content: &str) -> Result<Self> {
        let file: LibraryFile = toml::from_str(content)
            .map_err(|e| ConclaveError::config(format!("Failed to parse role library: {}", e)))?;
        let mut library = Self::new();
        for profile in file.roles {
            profile.validate()?;
            library.insert(profile);
        }
        Ok(library)
    }

    /// Add or replace a role
    pub fn insert(&mut self, profile: RoleProfile) {
        self.roles.insert(profile.name.clone(), profile);
    }

    pub fn get(&self, name: &str) -> Option<&RoleProfile> {
        self.roles.get(name)
    }

    /// Sorted role names
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.roles.keys().cloned().collect();
        names.sort();
        names
    }
}

const GROUP_MEMBER_SUFFIX: &str = "You must be able to work collaboratively in a group chat \
environment to complete tasks assigned by a leader or colleague.";

fn builtin_profiles() -> Vec<RoleProfile> {
    vec![
        RoleProfile::new(
            "Market_Analyst",
            "As a Market Analyst, one must possess strong analytical and problem-solving \
             abilities, collect necessary financial information and aggregate them based on \
             the client's requirement. For coding tasks, only use the functions you have been \
             provided with.",
        )
        .with_description("Collect and aggregate market data and company news.")
        .with_tools([
            "get_company_profile",
            "get_company_news",
            "get_basic_financials",
            "get_stock_data",
        ]),
        RoleProfile::new(
            "Expert_Investor",
            "Role: Expert Investor\n\
             Department: Finance\n\
             Primary Responsibility: Generation of customized financial analysis reports.\n\
             Deliver a report that answers the client's question with evidence from the \
             provided data, stating assumptions and risks explicitly.",
        )
        .with_description("Turn analysis into a customized financial report."),
        RoleProfile::new(
            "Financial_Analyst",
            format!(
                "As a Financial Analyst, interpret financial statements, build valuation \
                 arguments and flag inconsistencies in the figures you are given. {}",
                GROUP_MEMBER_SUFFIX
            ),
        )
        .with_description("Interpret statements and build valuation arguments."),
        RoleProfile::new(
            "Data_Analyst",
            format!(
                "As a Data Analyst, clean, aggregate and describe datasets, and report the \
                 figures that matter with their caveats. {}",
                GROUP_MEMBER_SUFFIX
            ),
        )
        .with_description("Clean, aggregate and describe datasets."),
        RoleProfile::new(
            "Statistician",
            format!(
                "As a Statistician, choose appropriate statistical methods, check their \
                 assumptions and report uncertainty alongside every estimate. {}",
                GROUP_MEMBER_SUFFIX
            ),
        )
        .with_description("Apply statistical methods and quantify uncertainty."),
        RoleProfile::new(
            "Software_Developer",
            format!(
                "As a Software Developer, write complete, runnable code for the task you are \
                 given and explain how to run it. {}",
                GROUP_MEMBER_SUFFIX
            ),
        )
        .with_description("Write complete, runnable code."),
        RoleProfile::new(
            "Accountant",
            format!(
                "As an Accountant, verify figures against accounting standards and reconcile \
                 the numbers reported by colleagues. {}",
                GROUP_MEMBER_SUFFIX
            ),
        )
        .with_description("Verify and reconcile reported figures."),
        RoleProfile::new(
            "Trading_Chat_Assistant",
            "You are an expert Trading Analyst Assistant helping users understand stock \
             analysis and make informed trading decisions.\n\n\
             Current Analysis Context:\n\
             - Ticker Symbol: {ticker}\n\
             - Risk-Reward Ratio: {risk_reward}\n\
             - Stop Loss Method: {stop_loss_method}\n\
             - Analysis Period: {period}\n\n\
             Explain indicators in simple terms, suggest parameter changes only with a clear \
             reason and always ask for confirmation before applying them.",
        )
        .with_description("Interactive assistant for technical trading analysis.")
        .with_tools([
            "comprehensive_analysis",
            "analyze_trading_opportunity",
            "calculate_position_size",
        ]),
    ]
}
