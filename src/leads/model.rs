//! Lead record model — typed fields, status enums, and field updates.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Stable positional identifier of a lead within its store.
pub type LeadIndex = usize;

/// Column headers used by the lead sheet.
pub mod columns {
    pub const EMAIL: &str = "Email";
    pub const COMPANY: &str = "Company";
    pub const INDUSTRY: &str = "Industry";
    pub const CONTACT_NUMBER: &str = "Contact Number";
    pub const PROCESSING_STATUS: &str = "Processing Status";
    pub const EMAIL_VERIFIED: &str = "Email Verified (Y/N)";
    pub const RESPONSE_STATUS: &str = "Response Status";
    pub const VERIFICATION_DATE: &str = "Verification Date";
    pub const OUTREACH_DATE: &str = "Outreach Date";
    pub const NOTES: &str = "Notes";

    /// Every column the pipeline knows by name.
    pub const KNOWN: &[&str] = &[
        EMAIL,
        COMPANY,
        INDUSTRY,
        CONTACT_NUMBER,
        PROCESSING_STATUS,
        EMAIL_VERIFIED,
        RESPONSE_STATUS,
        VERIFICATION_DATE,
        OUTREACH_DATE,
        NOTES,
    ];
}

/// Sheet timestamp format for verification/outreach dates.
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ── Processing status ───────────────────────────────────────────────

/// Pipeline stage of a lead. An unset status is `None` on the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessingStatus {
    Verifying,
    Verified,
    Outreach,
    Completed,
    Error,
}

impl ProcessingStatus {
    pub const ALL: [ProcessingStatus; 5] = [
        Self::Verifying,
        Self::Verified,
        Self::Outreach,
        Self::Completed,
        Self::Error,
    ];

    /// Check whether `current → target` follows the single forward path.
    ///
    /// `None` is the unset status of a freshly discovered lead. `Error` is
    /// reachable from any non-terminal state.
    pub fn can_transition(current: Option<ProcessingStatus>, target: ProcessingStatus) -> bool {
        use ProcessingStatus::*;

        match (current, target) {
            (Some(from), _) if from.is_terminal() => false,
            (_, Error) => true,
            (None, Verifying) => true,
            (Some(Verifying), Verified) => true,
            (Some(Verified), Outreach) => true,
            (Some(Outreach), Completed) => true,
            _ => false,
        }
    }

    /// Completed and Error leads are never touched by the pipeline again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Verifying => "Verifying",
            Self::Verified => "Verified",
            Self::Outreach => "Outreach",
            Self::Completed => "Completed",
            Self::Error => "Error",
        }
    }

    /// Parse a status cell. Blank or unrecognised cells read as unset.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "Verifying" => Some(Self::Verifying),
            "Verified" => Some(Self::Verified),
            "Outreach" => Some(Self::Outreach),
            "Completed" => Some(Self::Completed),
            "Error" => Some(Self::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Email verified ──────────────────────────────────────────────────

/// Verification verdict stored in the `Email Verified (Y/N)` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EmailVerified {
    Yes,
    No,
}

impl EmailVerified {
    pub fn from_passed(passed: bool) -> Self {
        if passed { Self::Yes } else { Self::No }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Yes => "Y",
            Self::No => "N",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "Y" | "y" => Some(Self::Yes),
            "N" | "n" => Some(Self::No),
            _ => None,
        }
    }
}

// ── Response status ─────────────────────────────────────────────────

/// Reply state of a contacted lead. Set to `PendingResponse` on send; the
/// other values are filled in outside the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResponseStatus {
    PendingResponse,
    Interested,
    NotInterested,
    NoResponse,
    /// Any value a human typed that is not one of the known categories.
    Other(String),
}

impl ResponseStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::PendingResponse => "Pending Response",
            Self::Interested => "Interested",
            Self::NotInterested => "Not Interested",
            Self::NoResponse => "No Response",
            Self::Other(s) => s,
        }
    }

    /// Parse a response cell. Blank cells read as unset.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "" => None,
            "Pending Response" => Some(Self::PendingResponse),
            "Interested" => Some(Self::Interested),
            "Not Interested" => Some(Self::NotInterested),
            "No Response" => Some(Self::NoResponse),
            other => Some(Self::Other(other.to_string())),
        }
    }
}

// ── Lead fields ─────────────────────────────────────────────────────

/// Contact fields the business rules read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LeadField {
    Email,
    Company,
    Industry,
    ContactNumber,
}

impl LeadField {
    pub fn column(&self) -> &'static str {
        match self {
            Self::Email => columns::EMAIL,
            Self::Company => columns::COMPANY,
            Self::Industry => columns::INDUSTRY,
            Self::ContactNumber => columns::CONTACT_NUMBER,
        }
    }
}

// ── Lead record ─────────────────────────────────────────────────────

/// A prospective customer tracked through verification and outreach.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadRecord {
    /// Position in the store, assigned by the store.
    pub index: LeadIndex,
    pub email: Option<String>,
    pub company: Option<String>,
    pub industry: Option<String>,
    pub contact_number: Option<String>,
    pub processing_status: Option<ProcessingStatus>,
    pub email_verified: Option<EmailVerified>,
    pub response_status: Option<ResponseStatus>,
    pub verification_date: Option<DateTime<Utc>>,
    pub outreach_date: Option<DateTime<Utc>>,
    /// Last error annotation.
    pub notes: Option<String>,
    /// Deployment-specific columns the pipeline does not interpret.
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

impl LeadRecord {
    /// Create an empty, unprocessed lead at `index`.
    pub fn new(index: LeadIndex) -> Self {
        Self {
            index,
            email: None,
            company: None,
            industry: None,
            contact_number: None,
            processing_status: None,
            email_verified: None,
            response_status: None,
            verification_date: None,
            outreach_date: None,
            notes: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_company(mut self, company: impl Into<String>) -> Self {
        self.company = Some(company.into());
        self
    }

    pub fn with_industry(mut self, industry: impl Into<String>) -> Self {
        self.industry = Some(industry.into());
        self
    }

    pub fn with_contact_number(mut self, number: impl Into<String>) -> Self {
        self.contact_number = Some(number.into());
        self
    }

    pub fn with_extra(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(column.into(), value.into());
        self
    }

    pub fn with_status(mut self, status: ProcessingStatus) -> Self {
        self.processing_status = Some(status);
        self
    }

    /// Build a record from a header → cell mapping (one sheet row).
    ///
    /// Blank cells read as unset; headers the pipeline does not know land in
    /// `extra`.
    pub fn from_columns(index: LeadIndex, row: &BTreeMap<String, String>) -> Self {
        let mut record = Self::new(index);
        for (column, value) in row {
            let text = non_blank(value);
            match column.as_str() {
                columns::EMAIL => record.email = text,
                columns::COMPANY => record.company = text,
                columns::INDUSTRY => record.industry = text,
                columns::CONTACT_NUMBER => record.contact_number = text,
                columns::PROCESSING_STATUS => {
                    record.processing_status = ProcessingStatus::parse(value)
                }
                columns::EMAIL_VERIFIED => record.email_verified = EmailVerified::parse(value),
                columns::RESPONSE_STATUS => record.response_status = ResponseStatus::parse(value),
                columns::VERIFICATION_DATE => record.verification_date = parse_sheet_date(value),
                columns::OUTREACH_DATE => record.outreach_date = parse_sheet_date(value),
                columns::NOTES => record.notes = text,
                _ => {
                    record.extra.insert(column.clone(), value.clone());
                }
            }
        }
        record
    }

    /// Read one of the contact fields.
    pub fn field(&self, field: LeadField) -> Option<&str> {
        match field {
            LeadField::Email => self.email.as_deref(),
            LeadField::Company => self.company.as_deref(),
            LeadField::Industry => self.industry.as_deref(),
            LeadField::ContactNumber => self.contact_number.as_deref(),
        }
    }

    /// A lead no stage has claimed yet.
    pub fn is_unprocessed(&self) -> bool {
        self.processing_status.is_none()
    }

    /// Apply the typed part of an update. Extra columns are the store's
    /// concern because only the store knows which columns exist.
    ///
    /// A status write that `can_transition` rejects is dropped; the rest of
    /// the update still applies. Verification and outreach dates are set once
    /// and never revised.
    pub fn apply(&mut self, update: &LeadUpdate) {
        if let Some(status) = update.processing_status {
            if ProcessingStatus::can_transition(self.processing_status, status) {
                self.processing_status = Some(status);
            } else {
                warn!(
                    lead_index = self.index,
                    from = ?self.processing_status,
                    to = %status,
                    "Ignoring out-of-order processing status write"
                );
            }
        }
        if let Some(verdict) = update.email_verified {
            self.email_verified = Some(verdict);
        }
        if let Some(ref response) = update.response_status {
            self.response_status = Some(response.clone());
        }
        if let Some(date) = update.verification_date {
            self.verification_date.get_or_insert(date);
        }
        if let Some(date) = update.outreach_date {
            self.outreach_date.get_or_insert(date);
        }
        if let Some(ref notes) = update.notes {
            self.notes = Some(notes.clone());
        }
    }
}

/// Only an empty cell is unset; any other text is kept as written.
fn non_blank(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

/// Render a timestamp the way the sheet stores it.
pub fn format_sheet_date(date: DateTime<Utc>) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Parse a sheet timestamp, accepting RFC 3339 as well.
pub fn parse_sheet_date(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(s, DATE_FORMAT)
        .ok()
        .map(|ndt| ndt.and_utc())
}

// ── Lead update ─────────────────────────────────────────────────────

/// A set of column writes applied to one lead in a single store call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LeadUpdate {
    pub processing_status: Option<ProcessingStatus>,
    pub email_verified: Option<EmailVerified>,
    pub response_status: Option<ResponseStatus>,
    pub verification_date: Option<DateTime<Utc>>,
    pub outreach_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    /// Writes to deployment-specific columns, keyed by header.
    pub extra: BTreeMap<String, String>,
}

impl LeadUpdate {
    /// Update that only moves the processing status.
    pub fn status(status: ProcessingStatus) -> Self {
        Self {
            processing_status: Some(status),
            ..Default::default()
        }
    }

    /// Verification verdict written once all checks ran.
    pub fn verified(verdict: EmailVerified, at: DateTime<Utc>) -> Self {
        Self {
            processing_status: Some(ProcessingStatus::Verified),
            email_verified: Some(verdict),
            verification_date: Some(at),
            ..Default::default()
        }
    }

    /// Successful delivery of the outreach message.
    pub fn completed(at: DateTime<Utc>) -> Self {
        Self {
            processing_status: Some(ProcessingStatus::Completed),
            response_status: Some(ResponseStatus::PendingResponse),
            outreach_date: Some(at),
            ..Default::default()
        }
    }

    /// Terminal failure with an annotation.
    pub fn error(note: impl Into<String>) -> Self {
        Self {
            processing_status: Some(ProcessingStatus::Error),
            notes: Some(note.into()),
            ..Default::default()
        }
    }

    pub fn with_extra(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(column.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Flatten into header → cell pairs, known columns first.
    pub fn to_columns(&self) -> Vec<(String, String)> {
        let mut cells = Vec::new();
        if let Some(status) = self.processing_status {
            cells.push((columns::PROCESSING_STATUS.to_string(), status.to_string()));
        }
        if let Some(verdict) = self.email_verified {
            cells.push((columns::EMAIL_VERIFIED.to_string(), verdict.as_str().to_string()));
        }
        if let Some(ref response) = self.response_status {
            cells.push((columns::RESPONSE_STATUS.to_string(), response.as_str().to_string()));
        }
        if let Some(date) = self.verification_date {
            cells.push((columns::VERIFICATION_DATE.to_string(), format_sheet_date(date)));
        }
        if let Some(date) = self.outreach_date {
            cells.push((columns::OUTREACH_DATE.to_string(), format_sheet_date(date)));
        }
        if let Some(ref notes) = self.notes {
            cells.push((columns::NOTES.to_string(), notes.clone()));
        }
        for (column, value) in &self.extra {
            cells.push((column.clone(), value.clone()));
        }
        cells
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_path_is_allowed() {
        use ProcessingStatus::*;
        assert!(ProcessingStatus::can_transition(None, Verifying));
        assert!(ProcessingStatus::can_transition(Some(Verifying), Verified));
        assert!(ProcessingStatus::can_transition(Some(Verified), Outreach));
        assert!(ProcessingStatus::can_transition(Some(Outreach), Completed));
    }

    #[test]
    fn error_reachable_from_non_terminal_states() {
        use ProcessingStatus::*;
        assert!(ProcessingStatus::can_transition(None, Error));
        assert!(ProcessingStatus::can_transition(Some(Verifying), Error));
        assert!(ProcessingStatus::can_transition(Some(Outreach), Error));
        assert!(!ProcessingStatus::can_transition(Some(Completed), Error));
    }

    #[test]
    fn backwards_and_skipping_transitions_rejected() {
        use ProcessingStatus::*;
        assert!(!ProcessingStatus::can_transition(Some(Verified), Verifying));
        assert!(!ProcessingStatus::can_transition(None, Outreach));
        assert!(!ProcessingStatus::can_transition(Some(Verifying), Completed));
        assert!(!ProcessingStatus::can_transition(Some(Error), Verifying));
    }

    #[test]
    fn status_cells_parse_and_render() {
        assert_eq!(ProcessingStatus::parse("Outreach"), Some(ProcessingStatus::Outreach));
        assert_eq!(ProcessingStatus::parse(""), None);
        assert_eq!(ProcessingStatus::Completed.to_string(), "Completed");
        assert_eq!(EmailVerified::parse("Y"), Some(EmailVerified::Yes));
        assert_eq!(EmailVerified::No.as_str(), "N");
        assert_eq!(
            ResponseStatus::parse("Maybe later"),
            Some(ResponseStatus::Other("Maybe later".into()))
        );
        assert_eq!(ResponseStatus::parse("  "), None);
    }

    #[test]
    fn from_columns_splits_known_and_extra() {
        let mut row = BTreeMap::new();
        row.insert("Email".to_string(), "a@acme.io".to_string());
        row.insert("Company".to_string(), "Acme".to_string());
        row.insert("Contact Number".to_string(), "555-1".to_string());
        row.insert("Processing Status".to_string(), "".to_string());
        row.insert("Region".to_string(), "EMEA".to_string());

        let record = LeadRecord::from_columns(7, &row);
        assert_eq!(record.index, 7);
        assert_eq!(record.email.as_deref(), Some("a@acme.io"));
        assert_eq!(record.field(LeadField::ContactNumber), Some("555-1"));
        assert!(record.is_unprocessed());
        assert_eq!(record.extra.get("Region").map(String::as_str), Some("EMEA"));
    }

    #[test]
    fn apply_sets_dates_once() {
        let first = Utc::now();
        let later = first + chrono::Duration::hours(1);

        let mut record = LeadRecord::new(0);
        record.apply(&LeadUpdate::status(ProcessingStatus::Verifying));
        record.apply(&LeadUpdate::verified(EmailVerified::Yes, first));
        record.apply(&LeadUpdate::verified(EmailVerified::Yes, later));

        assert_eq!(record.verification_date, Some(first));
        assert_eq!(record.processing_status, Some(ProcessingStatus::Verified));
    }

    #[test]
    fn apply_ignores_backward_status() {
        let mut record = LeadRecord::new(0);
        record.apply(&LeadUpdate::status(ProcessingStatus::Verifying));
        record.apply(&LeadUpdate::verified(EmailVerified::Yes, Utc::now()));
        record.apply(&LeadUpdate::status(ProcessingStatus::Outreach));
        record.apply(&LeadUpdate::completed(Utc::now()));

        record.apply(&LeadUpdate::status(ProcessingStatus::Verifying));
        assert_eq!(record.processing_status, Some(ProcessingStatus::Completed));

        record.apply(&LeadUpdate::error("late failure"));
        assert_eq!(record.processing_status, Some(ProcessingStatus::Completed));
        assert_eq!(record.notes.as_deref(), Some("late failure"));
    }

    #[test]
    fn apply_error_overwrites_notes() {
        let mut record = LeadRecord::new(0);
        record.apply(&LeadUpdate::error("Verification failed: one"));
        record.apply(&LeadUpdate::error("Verification failed: two"));
        assert_eq!(record.notes.as_deref(), Some("Verification failed: two"));
    }

    #[test]
    fn completed_update_columns() {
        let at = Utc::now();
        let cells = LeadUpdate::completed(at).to_columns();
        let headers: Vec<&str> = cells.iter().map(|(h, _)| h.as_str()).collect();
        assert_eq!(
            headers,
            vec!["Processing Status", "Response Status", "Outreach Date"]
        );
        assert_eq!(cells[1].1, "Pending Response");
        assert_eq!(parse_sheet_date(&cells[2].1).map(|d| d.timestamp()), Some(at.timestamp()));
    }

    #[test]
    fn empty_update() {
        assert!(LeadUpdate::default().is_empty());
        assert!(!LeadUpdate::default().with_extra("Owner", "sam").is_empty());
    }
}
