//! Business-rule checks run alongside address validation.
//!
//! Every rule is evaluated against the task snapshot; a lead passes only if
//! all of them pass:
//! - industry is not an excluded one (competitors)
//! - company is not an excluded one (placeholder test companies)
//! - Email, Company, and Contact Number are all filled in

use tracing::debug;

use crate::config::PipelineConfig;
use crate::leads::{LeadField, LeadRecord};

/// Which check a violation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    Industry,
    CompanySize,
    ContactDetails,
}

/// A failed check and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleViolation {
    pub rule: RuleKind,
    pub reason: String,
}

/// Outcome of `LeadRules::evaluate`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleReport {
    pub violations: Vec<RuleViolation>,
}

impl RuleReport {
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn failed(&self, rule: RuleKind) -> bool {
        self.violations.iter().any(|v| v.rule == rule)
    }

    /// Violation reasons joined with `"; "`, empty when the lead passed.
    pub fn reasons(&self) -> String {
        self.violations
            .iter()
            .map(|v| v.reason.as_str())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Lead qualification rules.
#[derive(Debug, Clone)]
pub struct LeadRules {
    /// Lowercased.
    excluded_industries: Vec<String>,
    /// Lowercased.
    excluded_companies: Vec<String>,
    required_fields: Vec<LeadField>,
}

impl LeadRules {
    /// Rules with the stock exclusion lists.
    pub fn default_rules() -> Self {
        Self::from_config(&PipelineConfig::default())
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            excluded_industries: lowercase_all(&config.excluded_industries),
            excluded_companies: lowercase_all(&config.excluded_companies),
            required_fields: vec![
                LeadField::Email,
                LeadField::Company,
                LeadField::ContactNumber,
            ],
        }
    }

    /// A missing industry passes.
    pub fn check_industry(&self, lead: &LeadRecord) -> bool {
        let industry = lead.industry.as_deref().unwrap_or_default().trim().to_lowercase();
        !self.excluded_industries.contains(&industry)
    }

    /// A missing company passes here; `check_contact_details` catches it.
    pub fn check_company_size(&self, lead: &LeadRecord) -> bool {
        let company = lead.company.as_deref().unwrap_or_default().trim().to_lowercase();
        !self.excluded_companies.contains(&company)
    }

    pub fn check_contact_details(&self, lead: &LeadRecord) -> bool {
        self.missing_fields(lead).is_empty()
    }

    fn missing_fields(&self, lead: &LeadRecord) -> Vec<&'static str> {
        self.required_fields
            .iter()
            .filter(|field| lead.field(**field).is_none_or(str::is_empty))
            .map(|field| field.column())
            .collect()
    }

    /// Run every check. No short-circuit: the report lists all violations.
    pub fn evaluate(&self, lead: &LeadRecord) -> RuleReport {
        let mut violations = Vec::new();

        if !self.check_industry(lead) {
            violations.push(RuleViolation {
                rule: RuleKind::Industry,
                reason: format!(
                    "excluded industry '{}'",
                    lead.industry.as_deref().unwrap_or_default()
                ),
            });
        }

        if !self.check_company_size(lead) {
            violations.push(RuleViolation {
                rule: RuleKind::CompanySize,
                reason: format!(
                    "excluded company '{}'",
                    lead.company.as_deref().unwrap_or_default()
                ),
            });
        }

        let missing = self.missing_fields(lead);
        if !missing.is_empty() {
            violations.push(RuleViolation {
                rule: RuleKind::ContactDetails,
                reason: format!("missing {}", missing.join(", ")),
            });
        }

        for violation in &violations {
            debug!(
                lead_index = lead.index,
                rule = ?violation.rule,
                reason = %violation.reason,
                "Lead failed rule"
            );
        }

        RuleReport { violations }
    }
}

fn lowercase_all(values: &[String]) -> Vec<String> {
    values.iter().map(|v| v.trim().to_lowercase()).collect()
}
