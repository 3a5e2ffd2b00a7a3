use invoice_factoring::{
    config::Settings,
    invoice::TimeStamp,
    logging,
    report::Portfolio,
    store::{InvoiceFilter, InvoiceStore, SledStore},
};
use tracing::info;

fn main() -> anyhow::Result<()> {
    let settings = Settings::load()?;
    logging::init_tracing(&settings.log_level, settings.json_logs);

    info!(path = %settings.database_path.display(), "Opening invoice store");
    let store = SledStore::open(&settings.database_path)?;

    let invoices = store.list(&InvoiceFilter::All)?;
    let portfolio = Portfolio::from_invoices(&invoices, &TimeStamp::new());

    println!("{portfolio}");
    Ok(())
}
