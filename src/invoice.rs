//! Invoice entity, line items and the draft builder
use super::bid::BidLedger;
use super::error::ValidationError;
use super::state::{FactoringStatus, InvoiceState, InvoiceStatus};
use chrono::{DateTime, TimeZone, Utc};

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
pub struct TimeStamp(DateTime<Utc>);

impl TimeStamp {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    pub fn new_with(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Option<Self> {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .single()
            .map(Self)
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
    /// Whether the nanosecond CBOR encoding can hold this instant (roughly 1677 to 2262).
    pub fn is_encodable(&self) -> bool {
        self.0.timestamp_nanos_opt().is_some()
    }
}

impl Default for TimeStamp {
    fn default() -> Self {
        Self::new()
    }
}

impl From<DateTime<Utc>> for TimeStamp {
    fn from(value: DateTime<Utc>) -> Self {
        TimeStamp(value)
    }
}

impl<C> minicbor::Encode<C> for TimeStamp {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct LineItem {
    #[n(0)]
    pub description: String,
    #[n(1)]
    pub quantity: u64,
    #[n(2)]
    pub unit_price: u64, // minor currency units
    #[n(3)]
    pub total: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct Totals {
    #[n(0)]
    pub subtotal: u64,
    #[n(1)]
    pub tax_amount: u64,
    #[n(2)]
    pub total_amount: u64,
}

// caller supplied line, priced server side
#[derive(Debug, Clone, PartialEq, Eq)]
struct ItemInput {
    description: String,
    quantity: u64,
    unit_price: u64,
}

/// Builder for the editable part of an invoice. Totals are never accepted from the caller;
/// they are derived in [`InvoiceDraft::validate_and_finalise`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvoiceDraft {
    client_email: Option<String>,
    client_name: Option<String>,
    notes: Option<String>,
    due_date: Option<TimeStamp>,
    items: Vec<ItemInput>,
    tax_amount: u64,
}

/// A draft that passed validation, with priced items and derived totals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalisedDraft {
    pub client_email: String,
    pub client_name: Option<String>,
    pub notes: Option<String>,
    pub due_date: Option<TimeStamp>,
    pub items: Vec<LineItem>,
    pub totals: Totals,
}

/// The stored invoice row. Items and bids live in their own rows.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct InvoiceHeader {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub number: String,
    #[n(2)]
    pub seller_id: String,
    #[n(3)]
    pub client_email: String,
    #[n(4)]
    pub client_name: Option<String>,
    #[n(5)]
    pub notes: Option<String>,
    #[n(6)]
    pub due_date: Option<TimeStamp>,
    #[n(7)]
    pub totals: Totals,
    #[n(8)]
    pub state: InvoiceState,
    #[n(9)]
    pub created_at: TimeStamp,
    #[n(10)]
    pub updated_at: TimeStamp,
}

/// Full snapshot of an invoice: header, line items and bids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invoice {
    pub header: InvoiceHeader,
    pub items: Vec<LineItem>,
    pub bids: BidLedger,
}

impl LineItem {
    pub fn new(description: &str, quantity: u64, unit_price: u64) -> Result<Self, ValidationError> {
        let total = quantity
            .checked_mul(unit_price)
            .ok_or(ValidationError::AmountOverflow)?;

        Ok(Self {
            description: description.trim().to_string(),
            quantity,
            unit_price,
            total,
        })
    }
}

impl Totals {
    /// Derives totals from items and tax. Pure, so recomputing never drifts.
    pub fn compute(items: &[LineItem], tax_amount: u64) -> Result<Self, ValidationError> {
        let subtotal = items.iter().try_fold(0u64, |acc, item| {
            acc.checked_add(item.total)
                .ok_or(ValidationError::AmountOverflow)
        })?;
        let total_amount = subtotal
            .checked_add(tax_amount)
            .ok_or(ValidationError::AmountOverflow)?;

        Ok(Self {
            subtotal,
            tax_amount,
            total_amount,
        })
    }
}

impl InvoiceDraft {
    /// Construct a new builder object, this becomes the basis for a draft
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_client_email(mut self, email: &str) -> Self {
        self.client_email = Some(email.to_string());
        self
    }
    pub fn set_client_name(mut self, name: &str) -> Self {
        self.client_name = Some(name.to_string());
        self
    }
    pub fn set_notes(mut self, notes: &str) -> Self {
        self.notes = Some(notes.to_string());
        self
    }
    pub fn set_due_date(mut self, date: TimeStamp) -> Self {
        self.due_date = Some(date);
        self
    }
    pub fn set_tax_amount(mut self, amount: u64) -> Self {
        self.tax_amount = amount;
        self
    }
    pub fn add_item(mut self, description: &str, quantity: u64, unit_price: u64) -> Self {
        self.items.push(ItemInput {
            description: description.to_string(),
            quantity,
            unit_price,
        });
        self
    }

    // Checks fields, prices every line and derives the totals
    pub fn validate_and_finalise(&self) -> Result<FinalisedDraft, ValidationError> {
        let client_email = match self.client_email.as_deref().map(str::trim) {
            None | Some("") => return Err(ValidationError::MissingClientEmail),
            Some(email) => email,
        };
        if !is_plausible_email(client_email) {
            return Err(ValidationError::InvalidClientEmail(client_email.to_string()));
        }
        if self.items.is_empty() {
            return Err(ValidationError::NoLineItems);
        }
        if self.due_date.is_some_and(|due| !due.is_encodable()) {
            return Err(ValidationError::DueDateOutOfRange);
        }

        let mut items = Vec::with_capacity(self.items.len());
        for (position, input) in self.items.iter().enumerate() {
            if input.description.trim().is_empty() {
                return Err(ValidationError::EmptyDescription(position));
            }
            if input.quantity == 0 {
                return Err(ValidationError::ZeroQuantity(position));
            }
            items.push(LineItem::new(
                &input.description,
                input.quantity,
                input.unit_price,
            )?);
        }
        let totals = Totals::compute(&items, self.tax_amount)?;

        Ok(FinalisedDraft {
            client_email: client_email.to_string(),
            client_name: non_empty(self.client_name.as_deref()),
            notes: non_empty(self.notes.as_deref()),
            due_date: self.due_date,
            items,
            totals,
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

impl Invoice {
    pub fn new(
        id: String,
        number: String,
        seller_id: &str,
        draft: FinalisedDraft,
        state: InvoiceState,
    ) -> Self {
        let now = TimeStamp::new();
        let header = InvoiceHeader {
            id,
            number,
            seller_id: seller_id.to_string(),
            client_email: draft.client_email,
            client_name: draft.client_name,
            notes: draft.notes,
            due_date: draft.due_date,
            totals: draft.totals,
            state,
            created_at: now,
            updated_at: now,
        };

        Self {
            header,
            items: draft.items,
            bids: BidLedger::new(),
        }
    }

    /// Replaces every editable field and all line items with the draft's.
    pub fn with_draft(&self, draft: FinalisedDraft, state: InvoiceState) -> Self {
        let header = InvoiceHeader {
            client_email: draft.client_email,
            client_name: draft.client_name,
            notes: draft.notes,
            due_date: draft.due_date,
            totals: draft.totals,
            state,
            updated_at: TimeStamp::new(),
            ..self.header.clone()
        };

        Self {
            header,
            items: draft.items,
            bids: self.bids.clone(),
        }
    }

    /// Same invoice in a new state.
    pub fn with_state(&self, state: InvoiceState) -> Self {
        let mut next = self.clone();
        next.header.state = state;
        next.header.updated_at = TimeStamp::new();
        next
    }

    pub fn id(&self) -> &str {
        &self.header.id
    }

    pub fn state(&self) -> &InvoiceState {
        &self.header.state
    }

    pub fn status(&self) -> InvoiceStatus {
        self.header.state.status()
    }

    pub fn factoring_status(&self) -> FactoringStatus {
        self.header.state.factoring_status()
    }

    pub fn is_factoring_requested(&self) -> bool {
        self.header.state.is_factoring_requested()
    }

    pub fn total_amount(&self) -> u64 {
        self.header.totals.total_amount
    }

    /// Lifecycle status as seen at `now`: a sent invoice past its due date reads as overdue.
    pub fn observed_status(&self, now: &TimeStamp) -> InvoiceStatus {
        match (self.status(), self.header.due_date.as_ref()) {
            (InvoiceStatus::Sent, Some(due)) if due < now => InvoiceStatus::Overdue,
            (status, _) => status,
        }
    }

    /// Re-derives every line total and the invoice totals and compares them with what is stored.
    pub fn verify_totals(&self) -> Result<(), ValidationError> {
        for item in &self.items {
            let expected = item
                .quantity
                .checked_mul(item.unit_price)
                .ok_or(ValidationError::AmountOverflow)?;
            if expected != item.total {
                return Err(ValidationError::TotalsMismatch);
            }
        }
        let expected = Totals::compute(&self.items, self.header.totals.tax_amount)?;
        if expected != self.header.totals {
            return Err(ValidationError::TotalsMismatch);
        }
        Ok(())
    }
}
