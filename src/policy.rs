//! Role and ownership checks for every invoice operation
use super::error::InvoiceError;
use super::invoice::Invoice;
use super::utils;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Seller,
    Buyer,
    Financier,
}

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: String,
    pub role: Role,
    pub email: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    View,
    CreateInvoice,
    UpdateInvoice,
    CloseInvoice,
    DeleteInvoice,
    RequestFactoring,
    RespondToFactoringRequest,
    PlaceBid,
    ResolveBid,
    WithdrawBid,
    ConfirmRepayment,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(String),
}

impl Actor {
    pub fn new(id: &str, role: Role, email: &str) -> Self {
        Self {
            id: id.to_string(),
            role,
            email: email.to_string(),
        }
    }

    pub fn owns(&self, invoice: &Invoice) -> bool {
        self.role == Role::Seller && invoice.header.seller_id == self.id
    }

    /// Buyers are matched on email, ignoring case and surrounding whitespace.
    pub fn receives(&self, invoice: &Invoice) -> bool {
        self.role == Role::Buyer
            && utils::emails_match(&self.email, &invoice.header.client_email)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let role = match self {
            Role::Seller => "seller",
            Role::Buyer => "buyer",
            Role::Financier => "financier",
        };
        f.write_str(role)
    }
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    /// Turns a denial into `NotAuthorized`.
    pub fn into_result(self) -> Result<(), InvoiceError> {
        match self {
            Decision::Allow => Ok(()),
            Decision::Deny(reason) => Err(InvoiceError::NotAuthorized(reason)),
        }
    }
}

/// Whether `actor` may see `invoice` at all.
pub fn is_visible(actor: &Actor, invoice: &Invoice) -> bool {
    match actor.role {
        Role::Seller => actor.owns(invoice),
        Role::Buyer => actor.receives(invoice),
        Role::Financier => invoice.factoring_status().is_financier_visible(),
    }
}

/// Decides whether `actor` may perform `operation` on `invoice`. For `CreateInvoice` the
/// snapshot is the invoice about to be created.
pub fn can_perform(actor: &Actor, operation: Operation, invoice: &Invoice) -> Decision {
    let required = match operation {
        Operation::View => {
            return if is_visible(actor, invoice) {
                Decision::Allow
            } else {
                Decision::Deny(format!("invoice is not visible to this {}", actor.role))
            };
        }
        Operation::CreateInvoice
        | Operation::UpdateInvoice
        | Operation::CloseInvoice
        | Operation::DeleteInvoice
        | Operation::RequestFactoring
        | Operation::ResolveBid => Role::Seller,
        Operation::RespondToFactoringRequest => Role::Buyer,
        Operation::PlaceBid | Operation::WithdrawBid | Operation::ConfirmRepayment => {
            Role::Financier
        }
    };

    if actor.role != required {
        return Decision::Deny(format!(
            "{:?} requires the {} role, caller is a {}",
            operation, required, actor.role
        ));
    }

    match required {
        Role::Seller if !actor.owns(invoice) => {
            Decision::Deny("only the invoice owner may do this".into())
        }
        Role::Buyer if !actor.receives(invoice) => {
            Decision::Deny("caller is not the recipient of this invoice".into())
        }
        Role::Financier if !invoice.factoring_status().is_financier_visible() => Decision::Deny(
            format!("invoice is not open to financiers ({})", invoice.factoring_status()),
        ),
        Role::Financier
            if operation == Operation::ConfirmRepayment
                && invoice.header.state.assigned_financier_id() != Some(actor.id.as_str()) =>
        {
            Decision::Deny("only the assigned financier may confirm repayment".into())
        }
        _ => Decision::Allow,
    }
}

/// `can_perform`, as a `Result`.
pub fn authorize(actor: &Actor, operation: Operation, invoice: &Invoice) -> Result<(), InvoiceError> {
    can_perform(actor, operation, invoice).into_result()
}
