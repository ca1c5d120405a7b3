use photon_core::session::Session;
use photon_types::Result;

pub(crate) fn run(session: &Session, path: Option<&str>) -> Result<()> {
    let source = super::local_source(session, path)?;
    let queued = session.import(&source)?;
    println!(
        "Scanned {}: {queued} new photo(s) queued for backup.",
        source.root().display()
    );
    Ok(())
}
