//! Lifecycle decisions: create, edit, close and delete
use super::error::InvoiceError;
use super::invoice::{Invoice, InvoiceDraft};
use super::policy::{self, Actor, Operation};
use super::state::{Factoring, InvoiceState, InvoiceStatus};
use super::transition::{Expected, Transition};

// Sending always starts factoring from scratch.
fn editable_target(target: InvoiceStatus) -> Result<InvoiceState, InvoiceError> {
    match target {
        InvoiceStatus::Draft => Ok(InvoiceState::Draft),
        InvoiceStatus::Sent => Ok(InvoiceState::Sent {
            factoring: Factoring::None,
        }),
        other => Err(InvoiceError::InvalidState(format!(
            "an invoice can only be saved as DRAFT or SENT, not {other}"
        ))),
    }
}

/// Builds a new invoice owned by `actor` in `target` (DRAFT or SENT).
pub fn create(
    actor: &Actor,
    id: String,
    number: String,
    draft: &InvoiceDraft,
    target: InvoiceStatus,
) -> Result<Invoice, InvoiceError> {
    let state = editable_target(target)?;
    let finalised = draft.validate_and_finalise()?;
    let invoice = Invoice::new(id, number, &actor.id, finalised, state);

    policy::authorize(actor, Operation::CreateInvoice, &invoice)?;
    Ok(invoice)
}

/// Replaces a draft's contents and optionally sends it.
pub fn update(
    actor: &Actor,
    invoice: &Invoice,
    draft: &InvoiceDraft,
    target: InvoiceStatus,
) -> Result<Transition, InvoiceError> {
    policy::authorize(actor, Operation::UpdateInvoice, invoice)?;

    if *invoice.state() != InvoiceState::Draft {
        return Err(InvoiceError::InvalidState(format!(
            "only DRAFT invoices can be edited, invoice {} is {}",
            invoice.header.number,
            invoice.status()
        )));
    }
    let state = editable_target(target)?;
    let finalised = draft.validate_and_finalise()?;

    let next = invoice.with_draft(finalised, state);
    Ok(Transition::new(invoice, next).replacing_items())
}

/// SENT to PAID or VOID. A financed invoice keeps its financing record.
pub fn close(
    actor: &Actor,
    invoice: &Invoice,
    target: InvoiceStatus,
) -> Result<Transition, InvoiceError> {
    policy::authorize(actor, Operation::CloseInvoice, invoice)?;

    let factoring = invoice.state().sent_factoring().ok_or_else(|| {
        InvoiceError::InvalidState(format!(
            "only SENT invoices can be closed, invoice {} is {}",
            invoice.header.number,
            invoice.status()
        ))
    })?;
    let settlement = factoring.clone().into_settlement();

    let state = match target {
        InvoiceStatus::Paid => InvoiceState::Paid { settlement },
        InvoiceStatus::Void => InvoiceState::Void { settlement },
        other => {
            return Err(InvoiceError::InvalidState(format!(
                "a sent invoice can only be closed as PAID or VOID, not {other}"
            )));
        }
    };

    Ok(Transition::new(invoice, invoice.with_state(state)))
}

/// Checks a delete and returns the status the stored invoice must still have.
pub fn delete(actor: &Actor, invoice: &Invoice) -> Result<Expected, InvoiceError> {
    policy::authorize(actor, Operation::DeleteInvoice, invoice)?;

    if invoice.state().has_settled_financing() {
        return Err(InvoiceError::InvalidState(format!(
            "invoice {} has been financed and cannot be deleted",
            invoice.header.number
        )));
    }
    Ok(Expected::of(invoice))
}
