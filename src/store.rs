//! Persistence boundary for invoices
//!
//! The decision functions never touch storage. A store fetches consistent snapshots and applies
//! [`Transition`]s through one compare-and-swap primitive: the write only happens if the stored
//! invoice still has the expected lifecycle and factoring status (and, for bid writes, the bid
//! still has its expected prior status). Otherwise the write is refused with
//! [`InvoiceError::Conflict`].
//!
//! [`SledStore`] keeps three trees keyed by invoice id: `invoices` (header), `items` (the line
//! item list) and `bids` (the bid list), all CBOR encoded. Every write spans the three trees in
//! one serializable transaction.
use super::bid::{Bid, BidLedger, BidStatus};
use super::error::InvoiceError;
use super::invoice::{Invoice, InvoiceHeader, LineItem};
use super::state::FactoringStatus;
use super::transition::{BidWrite, Expected, Transition};
use super::utils;
use sled::Transactional;
use sled::transaction::{ConflictableTransactionError, ConflictableTransactionResult, TransactionError};
use std::path::Path;
use std::sync::Arc;

/// Role specific listing queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvoiceFilter {
    All,
    Owner(String),
    Recipient(String),
    FactoringIn(Vec<FactoringStatus>),
}

pub trait InvoiceStore: Send + Sync {
    /// Next value of the invoice number sequence.
    fn next_number(&self) -> Result<u64, InvoiceError>;

    /// Inserts a brand new invoice with its items. Fails with `Conflict` if the id is taken.
    fn insert(&self, invoice: &Invoice) -> Result<(), InvoiceError>;

    fn fetch(&self, invoice_id: &str) -> Result<Option<Invoice>, InvoiceError>;

    /// Compare-and-swap: applies `transition` only if its expectations still hold.
    fn apply(&self, transition: &Transition) -> Result<(), InvoiceError>;

    /// Removes the invoice, its items and its bids together, if it still matches `expected`.
    fn delete(&self, invoice_id: &str, expected: Expected) -> Result<(), InvoiceError>;

    fn list(&self, filter: &InvoiceFilter) -> Result<Vec<Invoice>, InvoiceError>;
}

pub struct SledStore {
    instance: Arc<sled::Db>,
    invoices: sled::Tree,
    items: sled::Tree,
    bids: sled::Tree,
}

impl InvoiceFilter {
    pub fn matches(&self, header: &InvoiceHeader) -> bool {
        match self {
            InvoiceFilter::All => true,
            InvoiceFilter::Owner(seller_id) => header.seller_id == *seller_id,
            InvoiceFilter::Recipient(email) => utils::emails_match(email, &header.client_email),
            InvoiceFilter::FactoringIn(statuses) => {
                statuses.contains(&header.state.factoring_status())
            }
        }
    }
}

fn encode<T: minicbor::Encode<()> + ?Sized>(value: &T) -> Result<Vec<u8>, InvoiceError> {
    minicbor::to_vec(value).map_err(|e| InvoiceError::Encoding(e.to_string()))
}

fn decode<'b, T: minicbor::Decode<'b, ()>>(bytes: &'b [u8]) -> Result<T, InvoiceError> {
    minicbor::decode(bytes).map_err(|e| InvoiceError::Encoding(e.to_string()))
}

fn abort<T>(err: InvoiceError) -> ConflictableTransactionResult<T, InvoiceError> {
    Err(ConflictableTransactionError::Abort(err))
}

fn from_transaction(err: TransactionError<InvoiceError>) -> InvoiceError {
    match err {
        TransactionError::Abort(err) => err,
        TransactionError::Storage(err) => InvoiceError::Storage(err),
    }
}

fn decode_invoice(
    header: &[u8],
    items: Option<&[u8]>,
    bids: Option<&[u8]>,
) -> Result<Invoice, InvoiceError> {
    let header: InvoiceHeader = decode(header)?;
    let items: Vec<LineItem> = items.map(|bytes| decode(bytes)).transpose()?.unwrap_or_default();
    let bids: Vec<Bid> = bids.map(|bytes| decode(bytes)).transpose()?.unwrap_or_default();

    Ok(Invoice {
        header,
        items,
        bids: BidLedger::from_bids(bids),
    })
}

fn conflict(invoice_id: &str, expected: &Expected, found: &InvoiceHeader) -> InvoiceError {
    InvoiceError::Conflict(format!(
        "invoice {} expected {}/{}, found {}/{}",
        invoice_id,
        expected.status,
        expected.factoring,
        found.state.status(),
        found.state.factoring_status()
    ))
}

// applies a bid write to the stored bid list, re-checking the bid's prior status
fn apply_bid_write(stored: &mut Vec<Bid>, write: &BidWrite) -> Result<(), InvoiceError> {
    match write {
        BidWrite::Insert(bid) => {
            if stored.iter().any(|b| b.id == bid.id) {
                return Err(InvoiceError::Conflict(format!("bid {} already exists", bid.id)));
            }
            stored.push(bid.clone());
        }
        BidWrite::Resolve { bid_id, from, to } => {
            if *to == BidStatus::AcceptedByMsme
                && stored.iter().any(|b| b.status == BidStatus::AcceptedByMsme)
            {
                return Err(InvoiceError::Conflict(
                    "another bid has already been accepted".into(),
                ));
            }
            let bid = stored
                .iter_mut()
                .find(|b| b.id == *bid_id)
                .ok_or_else(|| InvoiceError::NotFound(format!("bid {bid_id}")))?;
            if bid.status != *from {
                return Err(InvoiceError::Conflict(format!(
                    "bid {} expected {}, found {}",
                    bid_id, from, bid.status
                )));
            }
            bid.status = *to;
        }
    }
    Ok(())
}

impl SledStore {
    pub fn new(instance: Arc<sled::Db>) -> Result<Self, InvoiceError> {
        let invoices = instance.open_tree("invoices")?;
        let items = instance.open_tree("items")?;
        let bids = instance.open_tree("bids")?;

        Ok(Self {
            instance,
            invoices,
            items,
            bids,
        })
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, InvoiceError> {
        Self::new(Arc::new(sled::open(path)?))
    }

    pub fn flush(&self) -> Result<(), InvoiceError> {
        self.instance.flush()?;
        Ok(())
    }
}

impl InvoiceStore for SledStore {
    fn next_number(&self) -> Result<u64, InvoiceError> {
        // generate_id starts at zero
        Ok(self.instance.generate_id()? + 1)
    }

    fn insert(&self, invoice: &Invoice) -> Result<(), InvoiceError> {
        let key = invoice.id().as_bytes();
        let header = encode(&invoice.header)?;
        let items = encode(invoice.items.as_slice())?;
        let bids = encode(invoice.bids.as_slice())?;

        (&self.invoices, &self.items, &self.bids)
            .transaction(|(invoices, item_rows, bid_rows)| {
                if invoices.get(key)?.is_some() {
                    return abort(InvoiceError::Conflict(format!(
                        "invoice {} already exists",
                        invoice.id()
                    )));
                }
                invoices.insert(key, header.as_slice())?;
                item_rows.insert(key, items.as_slice())?;
                bid_rows.insert(key, bids.as_slice())?;
                Ok(())
            })
            .map_err(from_transaction)
    }

    fn fetch(&self, invoice_id: &str) -> Result<Option<Invoice>, InvoiceError> {
        let key = invoice_id.as_bytes();

        let invoice = (&self.invoices, &self.items, &self.bids)
            .transaction(|(invoices, item_rows, bid_rows)| {
                let Some(header) = invoices.get(key)? else {
                    return Ok(None);
                };
                let item_bytes = item_rows.get(key)?;
                let bid_bytes = bid_rows.get(key)?;

                match decode_invoice(&header, item_bytes.as_deref(), bid_bytes.as_deref()) {
                    Ok(invoice) => Ok(Some(invoice)),
                    Err(err) => abort(err),
                }
            })
            .map_err(from_transaction)?;

        if let Some(invoice) = &invoice {
            invoice.verify_totals()?;
        }
        Ok(invoice)
    }

    fn apply(&self, transition: &Transition) -> Result<(), InvoiceError> {
        let invoice_id = transition.invoice_id();
        let key = invoice_id.as_bytes();
        let header = encode(&transition.next.header)?;
        let items = transition.items().map(|items| encode(items)).transpose()?;

        (&self.invoices, &self.items, &self.bids)
            .transaction(|(invoices, item_rows, bid_rows)| {
                let current: InvoiceHeader = match invoices.get(key)? {
                    Some(bytes) => decode(&bytes).map_err(ConflictableTransactionError::Abort)?,
                    None => {
                        return abort(InvoiceError::NotFound(format!("invoice {invoice_id}")));
                    }
                };
                if !transition.expected.matches(&current) {
                    return abort(conflict(invoice_id, &transition.expected, &current));
                }

                if let Some(write) = &transition.bid {
                    let mut stored: Vec<Bid> = match bid_rows.get(key)? {
                        Some(bytes) => {
                            decode(&bytes).map_err(ConflictableTransactionError::Abort)?
                        }
                        None => Vec::new(),
                    };
                    apply_bid_write(&mut stored, write)
                        .map_err(ConflictableTransactionError::Abort)?;
                    let encoded = encode(&stored).map_err(ConflictableTransactionError::Abort)?;
                    bid_rows.insert(key, encoded)?;
                }
                if let Some(items) = &items {
                    item_rows.insert(key, items.as_slice())?;
                }
                invoices.insert(key, header.as_slice())?;
                Ok(())
            })
            .map_err(from_transaction)
    }

    fn delete(&self, invoice_id: &str, expected: Expected) -> Result<(), InvoiceError> {
        let key = invoice_id.as_bytes();

        (&self.invoices, &self.items, &self.bids)
            .transaction(|(invoices, item_rows, bid_rows)| {
                let current: InvoiceHeader = match invoices.get(key)? {
                    Some(bytes) => decode(&bytes).map_err(ConflictableTransactionError::Abort)?,
                    None => {
                        return abort(InvoiceError::NotFound(format!("invoice {invoice_id}")));
                    }
                };
                if !expected.matches(&current) {
                    return abort(conflict(invoice_id, &expected, &current));
                }
                if current.state.has_settled_financing() {
                    return abort(InvoiceError::InvalidState(format!(
                        "invoice {} has been financed and cannot be deleted",
                        current.number
                    )));
                }

                bid_rows.remove(key)?;
                item_rows.remove(key)?;
                invoices.remove(key)?;
                Ok(())
            })
            .map_err(from_transaction)
    }

    fn list(&self, filter: &InvoiceFilter) -> Result<Vec<Invoice>, InvoiceError> {
        let mut ids = Vec::new();
        for row in self.invoices.iter() {
            let (key, bytes) = row?;
            let header: InvoiceHeader = decode(&bytes)?;
            if filter.matches(&header) {
                ids.push(String::from_utf8_lossy(&key).into_owned());
            }
        }

        let mut invoices = Vec::with_capacity(ids.len());
        for id in ids {
            // deleted since the scan
            if let Some(invoice) = self.fetch(&id)? {
                invoices.push(invoice);
            }
        }
        invoices.sort_by_key(|invoice| {
            (
                utils::invoice_sequence(&invoice.header.number),
                invoice.header.created_at,
            )
        });
        Ok(invoices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bid::Bid;

    #[test]
    fn stale_bid_resolution_is_a_conflict() {
        let mut bid = Bid::new("inv_1", "fin", 100, 300, 100).unwrap();
        bid.status = BidStatus::WithdrawnByFinancier;
        let mut stored = vec![bid.clone()];

        let err = apply_bid_write(
            &mut stored,
            &BidWrite::Resolve {
                bid_id: bid.id.clone(),
                from: BidStatus::Pending,
                to: BidStatus::AcceptedByMsme,
            },
        )
        .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(stored[0].status, BidStatus::WithdrawnByFinancier);
    }

    #[test]
    fn recipient_filter_ignores_case() {
        let filter = InvoiceFilter::Recipient("BUYER@example.com ".into());
        let draft = crate::invoice::InvoiceDraft::new()
            .set_client_email("buyer@Example.com")
            .add_item("Widgets", 1, 10)
            .validate_and_finalise()
            .unwrap();
        let invoice = Invoice::new(
            "inv_1".into(),
            "INV-000001".into(),
            "seller",
            draft,
            crate::state::InvoiceState::Draft,
        );
        assert!(filter.matches(&invoice.header));
        assert!(!InvoiceFilter::Owner("someone".into()).matches(&invoice.header));

        let mut umlaut = invoice.clone();
        umlaut.header.client_email = "JÖRG@example.com".into();
        assert!(InvoiceFilter::Recipient("jörg@example.com".into()).matches(&umlaut.header));
    }

    #[test]
    fn listing_orders_by_sequence_past_six_digits() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledStore::open(dir.path().join("ordering.db")).unwrap();
        let draft = crate::invoice::InvoiceDraft::new()
            .set_client_email("buyer@example.com")
            .add_item("Widgets", 1, 10);

        // inserted out of order on purpose
        for (id, sequence) in [("inv_a", 1_000_000), ("inv_b", 999_999), ("inv_c", 2)] {
            let invoice = Invoice::new(
                id.into(),
                utils::format_invoice_number(sequence),
                "seller",
                draft.validate_and_finalise().unwrap(),
                crate::state::InvoiceState::Draft,
            );
            store.insert(&invoice).unwrap();
        }

        let numbers: Vec<_> = store
            .list(&InvoiceFilter::All)
            .unwrap()
            .into_iter()
            .map(|invoice| invoice.header.number)
            .collect();
        assert_eq!(numbers, ["INV-000002", "INV-999999", "INV-1000000"]);
    }
}
