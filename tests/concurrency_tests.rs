//! Concurrent writers against one sled database
//!
//! Every write is a compare-and-swap on the stored status pair, so racing
//! clients must either win outright or get a retryable conflict. These tests
//! line threads up on a barrier to force the race.

use anyhow::Context;
use invoice_factoring::{
    bid::BidStatus,
    error::InvoiceError,
    factoring,
    identity::InMemoryDirectory,
    invoice::InvoiceDraft,
    policy::{Actor, Role},
    service::InvoiceService,
    state::{FactoringStatus, InvoiceStatus},
    store::{InvoiceStore, SledStore},
};
use sled::open;
use std::sync::{Arc, Barrier};
use std::thread;
use tempfile::tempdir;

const FINANCIERS: usize = 6;

fn seller() -> Actor {
    Actor::new("seller_1", Role::Seller, "seller@example.com")
}

fn buyer() -> Actor {
    Actor::new("buyer_1", Role::Buyer, "buyer@example.com")
}

fn financier(n: usize) -> Actor {
    Actor::new(&format!("fin_{n}"), Role::Financier, &format!("fin{n}@finance.example"))
}

fn directory() -> InMemoryDirectory {
    (0..FINANCIERS).fold(
        InMemoryDirectory::new().with(seller()).with(buyer()),
        |dir, n| dir.with(financier(n)),
    )
}

fn draft() -> InvoiceDraft {
    InvoiceDraft::new()
        .set_client_email("buyer@example.com")
        .add_item("Consulting", 2, 150)
        .add_item("Licence", 1, 300)
}

#[test]
fn racing_bid_acceptances_finance_once() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let db = Arc::new(open(dir.path().join("race_accept.db"))?);
    let store = Arc::new(SledStore::new(db)?);
    let service = InvoiceService::new(store.clone(), Arc::new(directory()));

    let invoice = service.create_invoice("seller_1", &draft(), InvoiceStatus::Sent)?;
    service.request_factoring("seller_1", invoice.id())?;
    service.respond_to_factoring_request("buyer_1", invoice.id(), true)?;
    let first = service.place_bid("fin_0", invoice.id(), 540, 400)?;
    let second = service.place_bid("fin_1", invoice.id(), 550, 450)?;

    // both clients decide against the same BIDDING snapshot
    let snapshot = store.fetch(invoice.id())?.context("invoice missing")?;
    let transitions = [
        factoring::resolve_bid(&seller(), &snapshot, &first.id, true)?,
        factoring::resolve_bid(&seller(), &snapshot, &second.id, true)?,
    ];

    let barrier = Arc::new(Barrier::new(transitions.len()));
    let handles: Vec<_> = transitions
        .into_iter()
        .map(|transition| {
            let store = store.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                store.apply(&transition)
            })
        })
        .collect();

    let results: Vec<_> = handles
        .into_iter()
        .map(|h| h.join().expect("writer thread panicked"))
        .collect();

    let wins = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(wins, 1, "exactly one acceptance must win: {results:?}");
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert!(matches!(err, InvoiceError::Conflict(_)));
        assert!(err.is_retryable());
    }

    let stored = store.fetch(invoice.id())?.context("invoice missing")?;
    assert_eq!(stored.factoring_status(), FactoringStatus::Financed);
    let accepted: Vec<_> = stored
        .bids
        .iter()
        .filter(|b| b.status == BidStatus::AcceptedByMsme)
        .collect();
    assert_eq!(accepted.len(), 1);
    assert_eq!(stored.state().accepted_bid_id(), Some(accepted[0].id.as_str()));

    Ok(())
}

#[test]
fn racing_service_acceptances_finance_once() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let db = Arc::new(open(dir.path().join("race_service.db"))?);
    let store = Arc::new(SledStore::new(db)?);
    let service = Arc::new(InvoiceService::new(store.clone(), Arc::new(directory())));

    let invoice = service.create_invoice("seller_1", &draft(), InvoiceStatus::Sent)?;
    service.request_factoring("seller_1", invoice.id())?;
    service.respond_to_factoring_request("buyer_1", invoice.id(), true)?;
    let bids = [
        service.place_bid("fin_0", invoice.id(), 540, 400)?,
        service.place_bid("fin_1", invoice.id(), 550, 450)?,
    ];

    let barrier = Arc::new(Barrier::new(bids.len()));
    let handles: Vec<_> = bids
        .into_iter()
        .map(|bid| {
            let service = service.clone();
            let barrier = barrier.clone();
            let invoice_id = invoice.id().to_string();
            thread::spawn(move || {
                barrier.wait();
                service.resolve_bid("seller_1", &invoice_id, &bid.id, true)
            })
        })
        .collect();

    let results: Vec<_> = handles
        .into_iter()
        .map(|h| h.join().expect("writer thread panicked"))
        .collect();

    // the loser either read the FINANCED snapshot or lost the write
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert!(matches!(
            err,
            InvoiceError::Conflict(_) | InvoiceError::InvalidState(_)
        ));
    }

    let stored = store.fetch(invoice.id())?.context("invoice missing")?;
    assert_eq!(stored.factoring_status(), FactoringStatus::Financed);
    assert!(stored.bids.accepted().is_some());

    Ok(())
}

#[test]
fn concurrent_bids_are_all_recorded() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let db = Arc::new(open(dir.path().join("many_bids.db"))?);
    let store = Arc::new(SledStore::new(db)?);
    let service = Arc::new(InvoiceService::new(store.clone(), Arc::new(directory())));

    let invoice = service.create_invoice("seller_1", &draft(), InvoiceStatus::Sent)?;
    service.request_factoring("seller_1", invoice.id())?;
    service.respond_to_factoring_request("buyer_1", invoice.id(), true)?;

    let barrier = Arc::new(Barrier::new(FINANCIERS));
    let handles: Vec<_> = (0..FINANCIERS)
        .map(|n| {
            let service = service.clone();
            let barrier = barrier.clone();
            let invoice_id = invoice.id().to_string();
            thread::spawn(move || {
                barrier.wait();
                // only the ACCEPTED to BIDDING step can conflict, so a retry settles it
                loop {
                    match service.place_bid(&format!("fin_{n}"), &invoice_id, 500 + n as u64, 300) {
                        Err(err) if err.is_retryable() => continue,
                        other => return other,
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("bidder thread panicked")?;
    }

    let stored = store.fetch(invoice.id())?.context("invoice missing")?;
    assert_eq!(stored.factoring_status(), FactoringStatus::Bidding);
    assert_eq!(stored.bids.len(), FINANCIERS);
    assert_eq!(stored.bids.pending_count(), FINANCIERS);

    Ok(())
}
