use photon_core::session::Session;
use photon_types::Result;

pub(crate) fn run(session: &Session) -> Result<()> {
    match session.sync_down()? {
        Some(changed) => {
            println!(
                "Catalog updated from remote: {changed} shard(s) changed, {} photo(s) known.",
                session.load_catalog().len()
            );
        }
        None => println!("Catalog already up to date."),
    }
    Ok(())
}
