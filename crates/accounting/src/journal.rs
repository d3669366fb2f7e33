use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tallybook_core::{Aggregate, AggregateRoot, AccountId, CompanyId, EntryId, JournalId, UserId};
use tallybook_events::Event;

use crate::error::{AccountingError, AccountingResult};
use crate::numbering::JournalNumber;
use crate::validation::JournalValidator;

/// Journal lifecycle: `draft → posted → voided`, or `draft → (deleted)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JournalStatus {
    Draft,
    Posted,
    Voided,
}

impl JournalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JournalStatus::Draft => "draft",
            JournalStatus::Posted => "posted",
            JournalStatus::Voided => "voided",
        }
    }
}

impl core::fmt::Display for JournalStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for JournalStatus {
    type Err = AccountingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "draft" => Ok(JournalStatus::Draft),
            "posted" => Ok(JournalStatus::Posted),
            "voided" => Ok(JournalStatus::Voided),
            _ => Err(AccountingError::Invalid(format!(
                "journal status must be one of: draft, posted, voided (got '{s}')"
            ))),
        }
    }
}

/// Transitions that can be refused because of the current status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JournalAction {
    Update,
    Delete,
    Post,
    Void,
}

impl core::fmt::Display for JournalAction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            JournalAction::Update => "updated",
            JournalAction::Delete => "deleted",
            JournalAction::Post => "posted",
            JournalAction::Void => "voided",
        })
    }
}

/// Entry as submitted by the caller (no identity yet).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryLine {
    pub account_id: AccountId,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub debit: Decimal,
    #[serde(default)]
    pub credit: Decimal,
    pub position: u32,
}

/// Stored entry of a journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: EntryId,
    pub account_id: AccountId,
    pub description: String,
    pub debit: Decimal,
    pub credit: Decimal,
    pub position: u32,
}

impl JournalEntry {
    fn from_line(line: EntryLine) -> Self {
        Self {
            id: EntryId::new(),
            account_id: line.account_id,
            description: line.description,
            debit: line.debit,
            credit: line.credit,
            position: line.position,
        }
    }
}

/// A journal as persisted, used to rebuild the aggregate from storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalRecord {
    pub id: JournalId,
    pub company_id: CompanyId,
    pub number: JournalNumber,
    pub transaction_date: NaiveDate,
    pub description: String,
    pub status: JournalStatus,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub posted_at: Option<DateTime<Utc>>,
    pub posted_by: Option<UserId>,
    pub entries: Vec<JournalEntry>,
    pub version: u64,
}

/// Aggregate root: Journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Journal {
    id: JournalId,
    company_id: CompanyId,
    number: JournalNumber,
    transaction_date: NaiveDate,
    description: String,
    status: JournalStatus,
    total_debit: Decimal,
    total_credit: Decimal,
    created_by: UserId,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    posted_at: Option<DateTime<Utc>>,
    posted_by: Option<UserId>,
    entries: Vec<JournalEntry>,
    version: u64,
    #[serde(skip)]
    created: bool,
    #[serde(skip)]
    deleted: bool,
}

impl Journal {
    /// Empty, not-yet-created aggregate, ready for `CreateJournal`.
    pub fn empty(id: JournalId, company_id: CompanyId) -> Self {
        Self {
            id,
            company_id,
            number: JournalNumber::compose(JournalNumber::DEFAULT_PREFIX, NaiveDate::default(), 0),
            transaction_date: NaiveDate::default(),
            description: String::new(),
            status: JournalStatus::Draft,
            total_debit: Decimal::ZERO,
            total_credit: Decimal::ZERO,
            created_by: UserId::from_uuid(Uuid::nil()),
            created_at: DateTime::<Utc>::UNIX_EPOCH,
            updated_at: DateTime::<Utc>::UNIX_EPOCH,
            posted_at: None,
            posted_by: None,
            entries: Vec::new(),
            version: 0,
            created: false,
            deleted: false,
        }
    }

    /// Rebuild a stored journal. Totals are recomputed from the entries.
    pub fn restore(record: JournalRecord) -> Self {
        let mut entries = record.entries;
        entries.sort_by_key(|e| e.position);
        let total_debit = entries.iter().map(|e| e.debit).sum();
        let total_credit = entries.iter().map(|e| e.credit).sum();

        Self {
            id: record.id,
            company_id: record.company_id,
            number: record.number,
            transaction_date: record.transaction_date,
            description: record.description,
            status: record.status,
            total_debit,
            total_credit,
            created_by: record.created_by,
            created_at: record.created_at,
            updated_at: record.updated_at,
            posted_at: record.posted_at,
            posted_by: record.posted_by,
            entries,
            version: record.version,
            created: true,
            deleted: false,
        }
    }

    pub fn id_typed(&self) -> JournalId {
        self.id
    }

    pub fn company_id(&self) -> CompanyId {
        self.company_id
    }

    pub fn number(&self) -> &JournalNumber {
        &self.number
    }

    pub fn transaction_date(&self) -> NaiveDate {
        self.transaction_date
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn status(&self) -> JournalStatus {
        self.status
    }

    pub fn total_debit(&self) -> Decimal {
        self.total_debit
    }

    pub fn total_credit(&self) -> Decimal {
        self.total_credit
    }

    pub fn created_by(&self) -> UserId {
        self.created_by
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn posted_at(&self) -> Option<DateTime<Utc>> {
        self.posted_at
    }

    pub fn posted_by(&self) -> Option<UserId> {
        self.posted_by
    }

    /// Entries in position order.
    pub fn entries(&self) -> &[JournalEntry] {
        &self.entries
    }

    pub fn is_created(&self) -> bool {
        self.created && !self.deleted
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    fn require_status(&self, action: JournalAction, required: JournalStatus) -> AccountingResult<()> {
        if self.status != required {
            return Err(AccountingError::StateConflict {
                action,
                required,
                actual: self.status,
            });
        }
        Ok(())
    }

    fn ensure_scope(&self, company_id: CompanyId) -> AccountingResult<()> {
        if company_id != self.company_id {
            return Err(AccountingError::CompanyMismatch(format!("journal {}", self.id)));
        }
        Ok(())
    }

    fn ensure_exists(&self) -> AccountingResult<()> {
        if !self.is_created() {
            return Err(AccountingError::JournalNotFound(self.id));
        }
        Ok(())
    }
}

impl AggregateRoot for Journal {
    type Id = JournalId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateJournal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateJournal {
    pub company_id: CompanyId,
    pub journal_id: JournalId,
    pub number: JournalNumber,
    pub transaction_date: NaiveDate,
    pub description: String,
    pub entries: Vec<EntryLine>,
    pub created_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateJournal (replaces date, description and all entries).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateJournal {
    pub company_id: CompanyId,
    pub journal_id: JournalId,
    pub transaction_date: NaiveDate,
    pub description: String,
    pub entries: Vec<EntryLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: PostJournal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostJournal {
    pub company_id: CompanyId,
    pub journal_id: JournalId,
    pub posted_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: VoidJournal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoidJournal {
    pub company_id: CompanyId,
    pub journal_id: JournalId,
    pub voided_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeleteJournal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteJournal {
    pub company_id: CompanyId,
    pub journal_id: JournalId,
    pub deleted_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JournalCommand {
    Create(CreateJournal),
    Update(UpdateJournal),
    Post(PostJournal),
    Void(VoidJournal),
    Delete(DeleteJournal),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalCreated {
    pub company_id: CompanyId,
    pub journal_id: JournalId,
    pub number: JournalNumber,
    pub transaction_date: NaiveDate,
    pub description: String,
    pub entries: Vec<JournalEntry>,
    pub total_debit: Decimal,
    pub total_credit: Decimal,
    pub created_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalUpdated {
    pub company_id: CompanyId,
    pub journal_id: JournalId,
    pub transaction_date: NaiveDate,
    pub description: String,
    pub entries: Vec<JournalEntry>,
    pub total_debit: Decimal,
    pub total_credit: Decimal,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalPosted {
    pub company_id: CompanyId,
    pub journal_id: JournalId,
    pub posted_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalVoided {
    pub company_id: CompanyId,
    pub journal_id: JournalId,
    pub voided_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalDeleted {
    pub company_id: CompanyId,
    pub journal_id: JournalId,
    pub deleted_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JournalEvent {
    Created(JournalCreated),
    Updated(JournalUpdated),
    Posted(JournalPosted),
    Voided(JournalVoided),
    Deleted(JournalDeleted),
}

impl JournalEvent {
    pub fn journal_id(&self) -> JournalId {
        match self {
            JournalEvent::Created(e) => e.journal_id,
            JournalEvent::Updated(e) => e.journal_id,
            JournalEvent::Posted(e) => e.journal_id,
            JournalEvent::Voided(e) => e.journal_id,
            JournalEvent::Deleted(e) => e.journal_id,
        }
    }

    pub fn company_id(&self) -> CompanyId {
        match self {
            JournalEvent::Created(e) => e.company_id,
            JournalEvent::Updated(e) => e.company_id,
            JournalEvent::Posted(e) => e.company_id,
            JournalEvent::Voided(e) => e.company_id,
            JournalEvent::Deleted(e) => e.company_id,
        }
    }

    /// The user who caused the event, when the event records one.
    pub fn actor(&self) -> Option<UserId> {
        match self {
            JournalEvent::Created(e) => Some(e.created_by),
            JournalEvent::Updated(_) => None,
            JournalEvent::Posted(e) => Some(e.posted_by),
            JournalEvent::Voided(e) => Some(e.voided_by),
            JournalEvent::Deleted(e) => Some(e.deleted_by),
        }
    }
}

impl Event for JournalEvent {
    fn event_type(&self) -> &'static str {
        match self {
            JournalEvent::Created(_) => "accounting.journal.created",
            JournalEvent::Updated(_) => "accounting.journal.updated",
            JournalEvent::Posted(_) => "accounting.journal.posted",
            JournalEvent::Voided(_) => "accounting.journal.voided",
            JournalEvent::Deleted(_) => "accounting.journal.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            JournalEvent::Created(e) => e.occurred_at,
            JournalEvent::Updated(e) => e.occurred_at,
            JournalEvent::Posted(e) => e.occurred_at,
            JournalEvent::Voided(e) => e.occurred_at,
            JournalEvent::Deleted(e) => e.occurred_at,
        }
    }
}

/// Validate lines and turn them into stored entries, ordered by position.
fn build_entries(lines: &[EntryLine]) -> AccountingResult<(Vec<JournalEntry>, Decimal, Decimal)> {
    let totals = JournalValidator::validate(lines).map_err(AccountingError::Validation)?;

    let mut sorted = lines.to_vec();
    sorted.sort_by_key(|l| l.position);
    let entries = sorted.into_iter().map(JournalEntry::from_line).collect();

    Ok((entries, totals.debit, totals.credit))
}

impl Aggregate for Journal {
    type Command = JournalCommand;
    type Event = JournalEvent;
    type Error = AccountingError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            JournalEvent::Created(e) => {
                self.id = e.journal_id;
                self.company_id = e.company_id;
                self.number = e.number.clone();
                self.transaction_date = e.transaction_date;
                self.description = e.description.clone();
                self.entries = e.entries.clone();
                self.total_debit = e.total_debit;
                self.total_credit = e.total_credit;
                self.created_by = e.created_by;
                self.created_at = e.occurred_at;
                self.updated_at = e.occurred_at;
                self.status = JournalStatus::Draft;
                self.created = true;
            }
            JournalEvent::Updated(e) => {
                self.transaction_date = e.transaction_date;
                self.description = e.description.clone();
                self.entries = e.entries.clone();
                self.total_debit = e.total_debit;
                self.total_credit = e.total_credit;
                self.updated_at = e.occurred_at;
            }
            JournalEvent::Posted(e) => {
                self.status = JournalStatus::Posted;
                self.posted_at = Some(e.occurred_at);
                self.posted_by = Some(e.posted_by);
                self.updated_at = e.occurred_at;
            }
            JournalEvent::Voided(e) => {
                self.status = JournalStatus::Voided;
                self.updated_at = e.occurred_at;
            }
            JournalEvent::Deleted(_) => {
                self.deleted = true;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            JournalCommand::Create(cmd) => self.handle_create(cmd),
            JournalCommand::Update(cmd) => self.handle_update(cmd),
            JournalCommand::Post(cmd) => self.handle_post(cmd),
            JournalCommand::Void(cmd) => self.handle_void(cmd),
            JournalCommand::Delete(cmd) => self.handle_delete(cmd),
        }
    }
}

impl Journal {
    fn handle_create(&self, cmd: &CreateJournal) -> AccountingResult<Vec<JournalEvent>> {
        self.ensure_scope(cmd.company_id)?;
        if self.created {
            return Err(AccountingError::JournalExists(self.id));
        }

        let (entries, total_debit, total_credit) = build_entries(&cmd.entries)?;

        Ok(vec![JournalEvent::Created(JournalCreated {
            company_id: cmd.company_id,
            journal_id: cmd.journal_id,
            number: cmd.number.clone(),
            transaction_date: cmd.transaction_date,
            description: cmd.description.clone(),
            entries,
            total_debit,
            total_credit,
            created_by: cmd.created_by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateJournal) -> AccountingResult<Vec<JournalEvent>> {
        self.ensure_scope(cmd.company_id)?;
        self.ensure_exists()?;
        self.require_status(JournalAction::Update, JournalStatus::Draft)?;

        let (entries, total_debit, total_credit) = build_entries(&cmd.entries)?;

        Ok(vec![JournalEvent::Updated(JournalUpdated {
            company_id: cmd.company_id,
            journal_id: cmd.journal_id,
            transaction_date: cmd.transaction_date,
            description: cmd.description.clone(),
            entries,
            total_debit,
            total_credit,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_post(&self, cmd: &PostJournal) -> AccountingResult<Vec<JournalEvent>> {
        self.ensure_scope(cmd.company_id)?;
        self.ensure_exists()?;
        self.require_status(JournalAction::Post, JournalStatus::Draft)?;

        Ok(vec![JournalEvent::Posted(JournalPosted {
            company_id: cmd.company_id,
            journal_id: cmd.journal_id,
            posted_by: cmd.posted_by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_void(&self, cmd: &VoidJournal) -> AccountingResult<Vec<JournalEvent>> {
        self.ensure_scope(cmd.company_id)?;
        self.ensure_exists()?;
        self.require_status(JournalAction::Void, JournalStatus::Posted)?;

        Ok(vec![JournalEvent::Voided(JournalVoided {
            company_id: cmd.company_id,
            journal_id: cmd.journal_id,
            voided_by: cmd.voided_by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delete(&self, cmd: &DeleteJournal) -> AccountingResult<Vec<JournalEvent>> {
        self.ensure_scope(cmd.company_id)?;
        self.ensure_exists()?;
        self.require_status(JournalAction::Delete, JournalStatus::Draft)?;

        Ok(vec![JournalEvent::Deleted(JournalDeleted {
            company_id: cmd.company_id,
            journal_id: cmd.journal_id,
            deleted_by: cmd.deleted_by,
            occurred_at: cmd.occurred_at,
        })])
    }
}
