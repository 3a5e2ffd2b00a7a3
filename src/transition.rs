//! The output of a decision: what to write and what must still hold when writing it
use super::bid::{Bid, BidStatus};
use super::invoice::{Invoice, InvoiceHeader, LineItem};
use super::state::{FactoringStatus, InvoiceStatus};

/// Status pair the stored invoice must still have for a write to go through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expected {
    pub status: InvoiceStatus,
    pub factoring: FactoringStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BidWrite {
    Insert(Bid),
    Resolve {
        bid_id: String,
        from: BidStatus,
        to: BidStatus,
    },
}

/// A decided state change, ready to be applied with compare-and-swap semantics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub expected: Expected,
    pub next: Invoice,
    pub replace_items: bool,
    pub bid: Option<BidWrite>,
}

impl Expected {
    pub fn of(invoice: &Invoice) -> Self {
        Self {
            status: invoice.status(),
            factoring: invoice.factoring_status(),
        }
    }

    pub fn matches(&self, header: &InvoiceHeader) -> bool {
        self.status == header.state.status() && self.factoring == header.state.factoring_status()
    }
}

impl Transition {
    pub fn new(prev: &Invoice, next: Invoice) -> Self {
        Self {
            expected: Expected::of(prev),
            next,
            replace_items: false,
            bid: None,
        }
    }

    pub fn replacing_items(mut self) -> Self {
        self.replace_items = true;
        self
    }

    pub fn with_bid(mut self, write: BidWrite) -> Self {
        self.bid = Some(write);
        self
    }

    pub fn invoice_id(&self) -> &str {
        self.next.id()
    }

    pub fn items(&self) -> Option<&[LineItem]> {
        self.replace_items.then_some(self.next.items.as_slice())
    }

    /// The bid touched by this transition, as it reads after the write.
    pub fn bid(&self) -> Option<&Bid> {
        match &self.bid {
            Some(BidWrite::Insert(bid)) => Some(bid),
            Some(BidWrite::Resolve { bid_id, .. }) => self.next.bids.get(bid_id),
            None => None,
        }
    }
}
