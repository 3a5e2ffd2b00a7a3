//! Factoring decisions driven by seller, buyer and financier
//!
//! Every function here is pure: it takes the caller and a snapshot, checks the policy and the
//! current factoring sub-state, and returns a [`Transition`] for the store to apply. Factoring
//! only moves while the invoice is SENT.
use super::bid::{Bid, BidStatus};
use super::error::InvoiceError;
use super::invoice::Invoice;
use super::policy::{self, Actor, Operation};
use super::state::{Factoring, Financing, InvoiceState};
use super::transition::{BidWrite, Transition};

fn sent_factoring(invoice: &Invoice) -> Result<&Factoring, InvoiceError> {
    invoice.state().sent_factoring().ok_or_else(|| {
        InvoiceError::InvalidState(format!(
            "invoice {} is {}, factoring requires SENT",
            invoice.header.number,
            invoice.status()
        ))
    })
}

fn unexpected(invoice: &Invoice, expected: &str) -> InvoiceError {
    InvoiceError::InvalidState(format!(
        "factoring on invoice {} is {}, expected {}",
        invoice.header.number,
        invoice.factoring_status(),
        expected
    ))
}

fn sent(factoring: Factoring) -> InvoiceState {
    InvoiceState::Sent { factoring }
}

/// Seller asks for the invoice to be factored.
pub fn request(actor: &Actor, invoice: &Invoice) -> Result<Transition, InvoiceError> {
    policy::authorize(actor, Operation::RequestFactoring, invoice)?;

    match sent_factoring(invoice)? {
        Factoring::None if invoice.total_amount() == 0 => Err(InvoiceError::InvalidState(
            "an invoice with a zero total cannot be factored".into(),
        )),
        Factoring::None => Ok(Transition::new(
            invoice,
            invoice.with_state(sent(Factoring::Requested)),
        )),
        _ => Err(unexpected(invoice, "NONE")),
    }
}

/// Buyer agrees to or declines the factoring request.
pub fn respond(actor: &Actor, invoice: &Invoice, accept: bool) -> Result<Transition, InvoiceError> {
    policy::authorize(actor, Operation::RespondToFactoringRequest, invoice)?;

    match sent_factoring(invoice)? {
        Factoring::Requested => {
            let next = if accept {
                Factoring::Accepted
            } else {
                Factoring::Rejected
            };
            Ok(Transition::new(invoice, invoice.with_state(sent(next))))
        }
        _ => Err(unexpected(invoice, "REQUESTED")),
    }
}

/// Financier offers `amount` at a discount of `fee_bps`. Opens bidding if it isn't open yet.
pub fn place_bid(
    actor: &Actor,
    invoice: &Invoice,
    amount: u64,
    fee_bps: u32,
) -> Result<Transition, InvoiceError> {
    policy::authorize(actor, Operation::PlaceBid, invoice)?;

    match sent_factoring(invoice)? {
        Factoring::Accepted | Factoring::Bidding => {}
        _ => return Err(unexpected(invoice, "ACCEPTED or BIDDING")),
    }
    let bid = Bid::new(invoice.id(), &actor.id, amount, fee_bps, invoice.total_amount())?;

    let mut next = invoice.with_state(sent(Factoring::Bidding));
    next.bids.push(bid.clone());

    Ok(Transition::new(invoice, next).with_bid(BidWrite::Insert(bid)))
}

/// Seller accepts (financing the invoice) or rejects a pending bid.
pub fn resolve_bid(
    actor: &Actor,
    invoice: &Invoice,
    bid_id: &str,
    accept: bool,
) -> Result<Transition, InvoiceError> {
    policy::authorize(actor, Operation::ResolveBid, invoice)?;

    if *sent_factoring(invoice)? != Factoring::Bidding {
        return Err(unexpected(invoice, "BIDDING"));
    }

    let to = if accept {
        BidStatus::AcceptedByMsme
    } else {
        BidStatus::RejectedByMsme
    };
    let mut bids = invoice.bids.clone();
    let bid = bids.resolve(bid_id, to)?;

    // rejecting the last pending bid leaves the invoice in BIDDING
    let factoring = if accept {
        Factoring::Financed(Financing {
            bid_id: bid.id.clone(),
            financier_id: bid.financier_id.clone(),
        })
    } else {
        Factoring::Bidding
    };

    let mut next = invoice.with_state(sent(factoring));
    next.bids = bids;

    Ok(Transition::new(invoice, next).with_bid(BidWrite::Resolve {
        bid_id: bid.id,
        from: BidStatus::Pending,
        to,
    }))
}

/// Financier takes back one of their own pending bids.
pub fn withdraw_bid(
    actor: &Actor,
    invoice: &Invoice,
    bid_id: &str,
) -> Result<Transition, InvoiceError> {
    policy::authorize(actor, Operation::WithdrawBid, invoice)?;

    if *sent_factoring(invoice)? != Factoring::Bidding {
        return Err(unexpected(invoice, "BIDDING"));
    }
    let owner = invoice
        .bids
        .get(bid_id)
        .ok_or_else(|| InvoiceError::NotFound(format!("bid {bid_id}")))?;
    if owner.financier_id != actor.id {
        return Err(InvoiceError::NotAuthorized(
            "only the financier who placed a bid may withdraw it".into(),
        ));
    }

    let mut next = invoice.with_state(sent(Factoring::Bidding));
    let bid = next.bids.resolve(bid_id, BidStatus::WithdrawnByFinancier)?;

    Ok(Transition::new(invoice, next).with_bid(BidWrite::Resolve {
        bid_id: bid.id,
        from: BidStatus::Pending,
        to: BidStatus::WithdrawnByFinancier,
    }))
}

/// Assigned financier records that the buyer has paid them back.
pub fn confirm_repayment(actor: &Actor, invoice: &Invoice) -> Result<Transition, InvoiceError> {
    policy::authorize(actor, Operation::ConfirmRepayment, invoice)?;

    match sent_factoring(invoice)? {
        Factoring::Financed(financing) => Ok(Transition::new(
            invoice,
            invoice.with_state(sent(Factoring::Repaid(financing.clone()))),
        )),
        _ => Err(unexpected(invoice, "FINANCED")),
    }
}
