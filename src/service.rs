//! Service layer API for invoice and factoring operations
use super::bid::Bid;
use super::error::InvoiceError;
use super::factoring;
use super::identity::Directory;
use super::invoice::{Invoice, InvoiceDraft};
use super::lifecycle;
use super::policy::{self, Actor, Role};
use super::state::{FINANCIER_VISIBLE, InvoiceStatus};
use super::store::{InvoiceFilter, InvoiceStore};
use super::transition::Transition;
use super::utils::{self, INVOICE_HRP};
use std::sync::Arc;
use tracing::{info, instrument, warn};

pub struct InvoiceService<S, D> {
    store: Arc<S>,
    directory: Arc<D>,
}

impl<S: InvoiceStore, D: Directory> InvoiceService<S, D> {
    pub fn new(store: Arc<S>, directory: Arc<D>) -> Self {
        Self { store, directory }
    }

    fn authenticate(&self, actor_id: &str) -> Result<Actor, InvoiceError> {
        self.directory
            .resolve(actor_id)
            .ok_or(InvoiceError::NotAuthenticated)
    }

    /// Load an invoice snapshot from the store
    fn load(&self, invoice_id: &str) -> Result<Invoice, InvoiceError> {
        self.store
            .fetch(invoice_id)?
            .ok_or_else(|| InvoiceError::NotFound(format!("invoice {invoice_id}")))
    }

    /// Write a decided transition, refusing it if the stored state moved on.
    ///
    /// Returns the invoice as stored after the write, so bids placed by other callers since the
    /// snapshot was read are included.
    fn commit(&self, transition: Transition) -> Result<Invoice, InvoiceError> {
        if let Err(err) = self.store.apply(&transition) {
            if err.is_retryable() {
                warn!(invoice_id = %transition.invoice_id(), error = %err, "optimistic write lost");
            }
            return Err(err);
        }
        // deleted right after our write
        Ok(self
            .store
            .fetch(transition.invoice_id())?
            .unwrap_or(transition.next))
    }

    /// Create a new invoice, either as a draft or directly sent
    #[instrument(skip(self, draft), fields(actor = %actor_id))]
    pub fn create_invoice(
        &self,
        actor_id: &str,
        draft: &InvoiceDraft,
        target: InvoiceStatus,
    ) -> Result<Invoice, InvoiceError> {
        let actor = self.authenticate(actor_id)?;
        if actor.role != Role::Seller {
            return Err(InvoiceError::NotAuthorized(format!(
                "only sellers create invoices, caller is a {}",
                actor.role
            )));
        }

        // bad drafts must not spend a sequence number
        draft.validate_and_finalise()?;

        let id = utils::new_uuid_to_bech32(INVOICE_HRP)?;
        let number = utils::format_invoice_number(self.store.next_number()?);
        let invoice = lifecycle::create(&actor, id, number, draft, target)?;

        self.store.insert(&invoice)?;

        info!(
            invoice_id = %invoice.id(),
            number = %invoice.header.number,
            status = %invoice.status(),
            total = invoice.total_amount(),
            "Invoice created"
        );
        Ok(invoice)
    }

    /// Replace a draft's contents, optionally sending it
    #[instrument(skip(self, draft), fields(actor = %actor_id))]
    pub fn update_invoice(
        &self,
        actor_id: &str,
        invoice_id: &str,
        draft: &InvoiceDraft,
        target: InvoiceStatus,
    ) -> Result<Invoice, InvoiceError> {
        let actor = self.authenticate(actor_id)?;
        let invoice = self.load(invoice_id)?;

        let invoice = self.commit(lifecycle::update(&actor, &invoice, draft, target)?)?;

        info!(status = %invoice.status(), total = invoice.total_amount(), "Invoice updated");
        Ok(invoice)
    }

    /// Mark a sent invoice as paid or void
    #[instrument(skip(self), fields(actor = %actor_id))]
    pub fn close_invoice(
        &self,
        actor_id: &str,
        invoice_id: &str,
        target: InvoiceStatus,
    ) -> Result<Invoice, InvoiceError> {
        let actor = self.authenticate(actor_id)?;
        let invoice = self.load(invoice_id)?;

        let invoice = self.commit(lifecycle::close(&actor, &invoice, target)?)?;

        info!(
            status = %invoice.status(),
            factoring = %invoice.factoring_status(),
            "Invoice closed"
        );
        Ok(invoice)
    }

    /// Delete an invoice with its items and bids
    #[instrument(skip(self), fields(actor = %actor_id))]
    pub fn delete_invoice(&self, actor_id: &str, invoice_id: &str) -> Result<(), InvoiceError> {
        let actor = self.authenticate(actor_id)?;
        let invoice = self.load(invoice_id)?;

        let expected = lifecycle::delete(&actor, &invoice)?;
        if let Err(err) = self.store.delete(invoice_id, expected) {
            if err.is_retryable() {
                warn!(error = %err, "optimistic delete lost");
            }
            return Err(err);
        }

        info!(number = %invoice.header.number, "Invoice deleted");
        Ok(())
    }

    #[instrument(skip(self), fields(actor = %actor_id))]
    pub fn request_factoring(
        &self,
        actor_id: &str,
        invoice_id: &str,
    ) -> Result<Invoice, InvoiceError> {
        let actor = self.authenticate(actor_id)?;
        let invoice = self.load(invoice_id)?;

        let invoice = self.commit(factoring::request(&actor, &invoice)?)?;

        info!(factoring = %invoice.factoring_status(), "Factoring requested");
        Ok(invoice)
    }

    #[instrument(skip(self), fields(actor = %actor_id))]
    pub fn respond_to_factoring_request(
        &self,
        actor_id: &str,
        invoice_id: &str,
        accept: bool,
    ) -> Result<Invoice, InvoiceError> {
        let actor = self.authenticate(actor_id)?;
        let invoice = self.load(invoice_id)?;

        let invoice = self.commit(factoring::respond(&actor, &invoice, accept)?)?;

        info!(factoring = %invoice.factoring_status(), "Buyer responded to factoring request");
        Ok(invoice)
    }

    /// Place a financier bid. `fee_bps` is the discount fee in basis points.
    #[instrument(skip(self), fields(actor = %actor_id))]
    pub fn place_bid(
        &self,
        actor_id: &str,
        invoice_id: &str,
        amount: u64,
        fee_bps: u32,
    ) -> Result<Bid, InvoiceError> {
        let actor = self.authenticate(actor_id)?;
        let invoice = self.load(invoice_id)?;

        let transition = factoring::place_bid(&actor, &invoice, amount, fee_bps)?;
        let bid = transition
            .bid()
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("bid placement produced no bid"))?;
        self.commit(transition)?;

        info!(bid_id = %bid.id, amount = bid.amount, fee_bps = bid.fee_bps, "Bid placed");
        Ok(bid)
    }

    /// Seller accepts or rejects a pending bid
    #[instrument(skip(self), fields(actor = %actor_id))]
    pub fn resolve_bid(
        &self,
        actor_id: &str,
        invoice_id: &str,
        bid_id: &str,
        accept: bool,
    ) -> Result<Invoice, InvoiceError> {
        let actor = self.authenticate(actor_id)?;
        let invoice = self.load(invoice_id)?;

        let invoice = self.commit(factoring::resolve_bid(&actor, &invoice, bid_id, accept)?)?;

        if !accept && invoice.bids.pending_count() == 0 {
            warn!("No pending bids remain, invoice stays in BIDDING");
        }
        info!(factoring = %invoice.factoring_status(), accept, "Bid resolved");
        Ok(invoice)
    }

    #[instrument(skip(self), fields(actor = %actor_id))]
    pub fn withdraw_bid(
        &self,
        actor_id: &str,
        invoice_id: &str,
        bid_id: &str,
    ) -> Result<Bid, InvoiceError> {
        let actor = self.authenticate(actor_id)?;
        let invoice = self.load(invoice_id)?;

        let transition = factoring::withdraw_bid(&actor, &invoice, bid_id)?;
        let bid = transition
            .bid()
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("bid withdrawal produced no bid"))?;
        self.commit(transition)?;

        info!("Bid withdrawn");
        Ok(bid)
    }

    /// Assigned financier confirms the invoice has been repaid
    #[instrument(skip(self), fields(actor = %actor_id))]
    pub fn confirm_repayment(
        &self,
        actor_id: &str,
        invoice_id: &str,
    ) -> Result<Invoice, InvoiceError> {
        let actor = self.authenticate(actor_id)?;
        let invoice = self.load(invoice_id)?;

        let invoice = self.commit(factoring::confirm_repayment(&actor, &invoice)?)?;

        info!("Repayment confirmed");
        Ok(invoice)
    }

    /// Fetch one invoice. Invoices the caller may not see are reported as missing.
    pub fn get_invoice(&self, actor_id: &str, invoice_id: &str) -> Result<Invoice, InvoiceError> {
        let actor = self.authenticate(actor_id)?;
        let invoice = self.load(invoice_id)?;

        if !policy::is_visible(&actor, &invoice) {
            return Err(InvoiceError::NotFound(format!("invoice {invoice_id}")));
        }
        Ok(invoice)
    }

    /// Invoices the caller owns, receives or may bid on, depending on role
    pub fn list_invoices(&self, actor_id: &str) -> Result<Vec<Invoice>, InvoiceError> {
        let actor = self.authenticate(actor_id)?;

        let filter = match actor.role {
            Role::Seller => InvoiceFilter::Owner(actor.id),
            Role::Buyer => InvoiceFilter::Recipient(actor.email),
            Role::Financier => InvoiceFilter::FactoringIn(FINANCIER_VISIBLE.to_vec()),
        };
        self.store.list(&filter)
    }
}
