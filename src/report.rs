//! Portfolio summary across a set of invoices
use super::invoice::{Invoice, TimeStamp};
use super::state::{FactoringStatus, InvoiceStatus};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Portfolio {
    pub counts: BTreeMap<(InvoiceStatus, FactoringStatus), usize>,
    /// Face value of sent invoices, overdue included.
    pub receivables: u64,
    /// Accepted bid amounts on invoices that are financed but not yet repaid.
    pub financed_outstanding: u64,
}

impl Portfolio {
    pub fn from_invoices(invoices: &[Invoice], now: &TimeStamp) -> Self {
        let mut portfolio = Self::default();

        for invoice in invoices {
            let status = invoice.observed_status(now);
            let factoring = invoice.factoring_status();
            *portfolio.counts.entry((status, factoring)).or_default() += 1;

            if matches!(status, InvoiceStatus::Sent | InvoiceStatus::Overdue) {
                portfolio.receivables = portfolio.receivables.saturating_add(invoice.total_amount());
            }
            if factoring == FactoringStatus::Financed {
                if let Some(bid) = invoice.bids.accepted() {
                    portfolio.financed_outstanding =
                        portfolio.financed_outstanding.saturating_add(bid.amount);
                }
            }
        }
        portfolio
    }

    pub fn invoice_count(&self) -> usize {
        self.counts.values().sum()
    }
}

impl fmt::Display for Portfolio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<10} {:<10} {:>6}", "STATUS", "FACTORING", "COUNT")?;
        for ((status, factoring), count) in &self.counts {
            writeln!(f, "{:<10} {:<10} {:>6}", status.as_str(), factoring.as_str(), count)?;
        }
        writeln!(f, "invoices: {}", self.invoice_count())?;
        writeln!(f, "receivables: {}", self.receivables)?;
        write!(f, "financed outstanding: {}", self.financed_outstanding)
    }
}
