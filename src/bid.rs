//! Financier bids on a factored invoice
use super::error::{InvoiceError, ValidationError};
use super::invoice::TimeStamp;
use super::utils::{self, BID_HRP};
use std::fmt;

/// Upper bound (exclusive) on the discount fee, in basis points. 10_000 bps is 100%.
pub const MAX_FEE_BPS: u32 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, minicbor::Encode, minicbor::Decode)]
pub enum BidStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    AcceptedByMsme,
    #[n(2)]
    RejectedByMsme,
    #[n(3)]
    WithdrawnByFinancier,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct Bid {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub invoice_id: String,
    #[n(2)]
    pub financier_id: String,
    #[n(3)]
    pub amount: u64, // minor currency units
    #[n(4)]
    pub fee_bps: u32,
    #[n(5)]
    pub status: BidStatus,
    #[n(6)]
    pub created_at: TimeStamp,
}

/// The bids placed against one invoice, in the order they were placed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BidLedger {
    bids: Vec<Bid>,
}

impl BidStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BidStatus::Pending => "PENDING",
            BidStatus::AcceptedByMsme => "ACCEPTED_BY_MSME",
            BidStatus::RejectedByMsme => "REJECTED_BY_MSME",
            BidStatus::WithdrawnByFinancier => "WITHDRAWN_BY_FINANCIER",
        }
    }
}

impl fmt::Display for BidStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Bid {
    /// Checks amount and fee against the invoice total and builds a pending bid.
    pub fn new(
        invoice_id: &str,
        financier_id: &str,
        amount: u64,
        fee_bps: u32,
        invoice_total: u64,
    ) -> Result<Self, InvoiceError> {
        if amount == 0 {
            return Err(ValidationError::ZeroBidAmount.into());
        }
        if amount > invoice_total {
            return Err(ValidationError::BidExceedsTotal {
                amount,
                total: invoice_total,
            }
            .into());
        }
        if fee_bps == 0 || fee_bps >= MAX_FEE_BPS {
            return Err(ValidationError::FeeOutOfRange(fee_bps).into());
        }

        Ok(Self {
            id: utils::new_uuid_to_bech32(BID_HRP)?,
            invoice_id: invoice_id.to_string(),
            financier_id: financier_id.to_string(),
            amount,
            fee_bps,
            status: BidStatus::Pending,
            created_at: TimeStamp::new(),
        })
    }

    pub fn is_pending(&self) -> bool {
        self.status == BidStatus::Pending
    }

    /// The fee the financier keeps, rounded down.
    pub fn fee_amount(&self) -> u64 {
        (u128::from(self.amount) * u128::from(self.fee_bps) / u128::from(MAX_FEE_BPS)) as u64
    }
}

impl BidLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bids(bids: Vec<Bid>) -> Self {
        Self { bids }
    }

    pub fn as_slice(&self) -> &[Bid] {
        &self.bids
    }

    pub fn into_bids(self) -> Vec<Bid> {
        self.bids
    }

    pub fn iter(&self) -> impl Iterator<Item = &Bid> {
        self.bids.iter()
    }

    pub fn len(&self) -> usize {
        self.bids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty()
    }

    pub fn get(&self, bid_id: &str) -> Option<&Bid> {
        self.bids.iter().find(|b| b.id == bid_id)
    }

    pub fn pending_count(&self) -> usize {
        self.bids.iter().filter(|b| b.is_pending()).count()
    }

    pub fn accepted(&self) -> Option<&Bid> {
        self.bids
            .iter()
            .find(|b| b.status == BidStatus::AcceptedByMsme)
    }

    pub fn push(&mut self, bid: Bid) {
        self.bids.push(bid);
    }

    /// Moves a pending bid to `to` and returns the updated bid.
    ///
    /// Only pending bids resolve, and a ledger never holds two accepted bids.
    pub fn resolve(&mut self, bid_id: &str, to: BidStatus) -> Result<Bid, InvoiceError> {
        if to == BidStatus::Pending {
            return Err(InvoiceError::InvalidState(
                "a bid cannot be moved back to PENDING".into(),
            ));
        }
        if to == BidStatus::AcceptedByMsme && self.accepted().is_some() {
            return Err(InvoiceError::InvalidState(
                "another bid on this invoice has already been accepted".into(),
            ));
        }

        let bid = self
            .bids
            .iter_mut()
            .find(|b| b.id == bid_id)
            .ok_or_else(|| InvoiceError::NotFound(format!("bid {bid_id}")))?;

        if !bid.is_pending() {
            return Err(InvoiceError::InvalidState(format!(
                "bid {} is {}, expected PENDING",
                bid.id, bid.status
            )));
        }

        bid.status = to;
        Ok(bid.clone())
    }
}
