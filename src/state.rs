//! Combined lifecycle and factoring state of an invoice
//!
//! Lifecycle and factoring are not independent: factoring only moves while an invoice is sent,
//! and a closed invoice only remembers factoring if money changed hands. [`InvoiceState`] holds
//! both dimensions in one type so the illegal combinations cannot be built. The flat
//! [`InvoiceStatus`] and [`FactoringStatus`] enums are read-only projections used for guards,
//! filters and display.
use std::fmt;

/// Record of the bid that financed an invoice.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct Financing {
    #[n(0)]
    pub bid_id: String,
    #[n(1)]
    pub financier_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub enum Factoring {
    #[n(0)]
    None,
    #[n(1)]
    Requested,
    #[n(2)]
    Accepted,
    #[n(3)]
    Rejected,
    #[n(4)]
    Bidding,
    #[n(5)]
    Financed(#[n(0)] Financing),
    #[n(6)]
    Repaid(#[n(0)] Financing),
}

/// What a closed invoice keeps of its factoring history.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub enum Settlement {
    #[n(0)]
    Financed(#[n(0)] Financing),
    #[n(1)]
    Repaid(#[n(0)] Financing),
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub enum InvoiceState {
    #[n(0)]
    Draft,
    #[n(1)]
    Sent {
        #[n(0)]
        factoring: Factoring,
    },
    #[n(2)]
    Paid {
        #[n(0)]
        settlement: Option<Settlement>,
    },
    #[n(3)]
    Void {
        #[n(0)]
        settlement: Option<Settlement>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Paid,
    Overdue,
    Void,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FactoringStatus {
    None,
    Requested,
    Accepted,
    Rejected,
    Bidding,
    Financed,
    Repaid,
}

/// Factoring states a financier may see and act on.
pub const FINANCIER_VISIBLE: [FactoringStatus; 3] = [
    FactoringStatus::Accepted,
    FactoringStatus::Bidding,
    FactoringStatus::Financed,
];

impl Factoring {
    pub fn status(&self) -> FactoringStatus {
        match self {
            Factoring::None => FactoringStatus::None,
            Factoring::Requested => FactoringStatus::Requested,
            Factoring::Accepted => FactoringStatus::Accepted,
            Factoring::Rejected => FactoringStatus::Rejected,
            Factoring::Bidding => FactoringStatus::Bidding,
            Factoring::Financed(_) => FactoringStatus::Financed,
            Factoring::Repaid(_) => FactoringStatus::Repaid,
        }
    }

    pub fn financing(&self) -> Option<&Financing> {
        match self {
            Factoring::Financed(f) | Factoring::Repaid(f) => Some(f),
            _ => None,
        }
    }

    /// Factoring kept when the invoice is closed. Anything short of financing is dropped.
    pub fn into_settlement(self) -> Option<Settlement> {
        match self {
            Factoring::Financed(f) => Some(Settlement::Financed(f)),
            Factoring::Repaid(f) => Some(Settlement::Repaid(f)),
            _ => None,
        }
    }
}

impl Settlement {
    pub fn financing(&self) -> &Financing {
        match self {
            Settlement::Financed(f) | Settlement::Repaid(f) => f,
        }
    }

    pub fn status(&self) -> FactoringStatus {
        match self {
            Settlement::Financed(_) => FactoringStatus::Financed,
            Settlement::Repaid(_) => FactoringStatus::Repaid,
        }
    }
}

impl InvoiceState {
    /// Stored lifecycle status. Overdue is never stored, see `Invoice::observed_status`.
    pub fn status(&self) -> InvoiceStatus {
        match self {
            InvoiceState::Draft => InvoiceStatus::Draft,
            InvoiceState::Sent { .. } => InvoiceStatus::Sent,
            InvoiceState::Paid { .. } => InvoiceStatus::Paid,
            InvoiceState::Void { .. } => InvoiceStatus::Void,
        }
    }

    pub fn factoring_status(&self) -> FactoringStatus {
        match self {
            InvoiceState::Draft => FactoringStatus::None,
            InvoiceState::Sent { factoring } => factoring.status(),
            InvoiceState::Paid { settlement } | InvoiceState::Void { settlement } => settlement
                .as_ref()
                .map_or(FactoringStatus::None, Settlement::status),
        }
    }

    pub fn is_factoring_requested(&self) -> bool {
        self.factoring_status() != FactoringStatus::None
    }

    pub fn financing(&self) -> Option<&Financing> {
        match self {
            InvoiceState::Draft => None,
            InvoiceState::Sent { factoring } => factoring.financing(),
            InvoiceState::Paid { settlement } | InvoiceState::Void { settlement } => {
                settlement.as_ref().map(Settlement::financing)
            }
        }
    }

    pub fn accepted_bid_id(&self) -> Option<&str> {
        self.financing().map(|f| f.bid_id.as_str())
    }

    pub fn assigned_financier_id(&self) -> Option<&str> {
        self.financing().map(|f| f.financier_id.as_str())
    }

    /// Money has moved once an invoice has been financed, whatever happened after.
    pub fn has_settled_financing(&self) -> bool {
        self.financing().is_some()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, InvoiceState::Paid { .. } | InvoiceState::Void { .. })
    }

    /// The factoring sub-state, only available while the invoice is sent.
    pub fn sent_factoring(&self) -> Option<&Factoring> {
        match self {
            InvoiceState::Sent { factoring } => Some(factoring),
            _ => None,
        }
    }
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "DRAFT",
            InvoiceStatus::Sent => "SENT",
            InvoiceStatus::Paid => "PAID",
            InvoiceStatus::Overdue => "OVERDUE",
            InvoiceStatus::Void => "VOID",
        }
    }
}

impl FactoringStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FactoringStatus::None => "NONE",
            FactoringStatus::Requested => "REQUESTED",
            FactoringStatus::Accepted => "ACCEPTED",
            FactoringStatus::Rejected => "REJECTED",
            FactoringStatus::Bidding => "BIDDING",
            FactoringStatus::Financed => "FINANCED",
            FactoringStatus::Repaid => "REPAID",
        }
    }

    pub fn is_financier_visible(&self) -> bool {
        FINANCIER_VISIBLE.contains(self)
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for FactoringStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
