use photon_core::catalog::BackupState;
use photon_core::queue::FailureKind;
use photon_core::session::Session;
use photon_types::Result;

pub(crate) fn run(session: &Session) -> Result<()> {
    let entries = session.load_catalog();
    let count_of = |state: BackupState| entries.iter().filter(|e| e.backup_state == state).count();

    println!("Photos known:  {}", entries.len());
    println!("  uploaded:    {}", count_of(BackupState::Uploaded));
    println!("  queued:      {}", count_of(BackupState::Queued));
    println!("  uploading:   {}", count_of(BackupState::Uploading));
    println!("  failed:      {}", count_of(BackupState::Failed));
    println!("  not queued:  {}", count_of(BackupState::None));

    let failed: Vec<_> = entries
        .iter()
        .filter(|e| e.backup_state == BackupState::Failed)
        .collect();
    if !failed.is_empty() {
        println!();
        println!("Failed items:");
        for entry in failed {
            let kind = match session.failure_of(&entry.photo_key) {
                Some(FailureKind::Transient) => "transient",
                Some(FailureKind::Permanent) => "permanent",
                None => "unknown",
            };
            println!("  {}  ({kind}, {})", entry.photo_key, entry.format);
        }
    }
    Ok(())
}
