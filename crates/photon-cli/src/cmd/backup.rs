use photon_core::cancel::CancelToken;
use photon_core::session::Session;
use photon_types::Result;

pub(crate) fn run(session: &Session, path: Option<&str>) -> Result<()> {
    let source = super::local_source(session, path)?;
    let queued = session.import(&source)?;
    if queued > 0 {
        println!("{queued} new photo(s) queued.");
    }

    let cancel = CancelToken::new();
    let stats = session.process_queue(&source, &cancel)?;
    println!(
        "Backup finished: {} uploaded, {} failed, {} re-queued.",
        stats.uploaded, stats.failed, stats.requeued
    );
    if stats.failed > 0 {
        println!("Run `photon status` for failed items, `photon retry` to re-queue them.");
    }
    Ok(())
}
