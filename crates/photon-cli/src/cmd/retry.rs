use photon_core::catalog::BackupState;
use photon_core::session::Session;
use photon_types::Result;

pub(crate) fn run(session: &Session, key: Option<&str>) -> Result<()> {
    match key {
        Some(key) => {
            if session.retry(key) {
                println!("Re-queued {key}.");
            } else {
                println!("{key} is not in the failed state.");
            }
        }
        None => {
            let failed: Vec<String> = session
                .load_catalog()
                .into_iter()
                .filter(|e| e.backup_state == BackupState::Failed)
                .map(|e| e.photo_key)
                .collect();
            let mut requeued = 0;
            for key in failed {
                if session.retry(&key) {
                    requeued += 1;
                }
            }
            println!("Re-queued {requeued} failed item(s).");
        }
    }
    println!("Run `photon backup` to upload.");
    Ok(())
}
