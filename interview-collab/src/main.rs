//! interview-collab: maintenance entry point for the room and document
//! stores.
//!
//! Store locations come from `COLLAB_DB_PATH`, `YJS_DB_PATH` and
//! `YJS_FLUSH_SIZE` (a `.env` file is honoured).
//!
//! ```text
//! interview-collab status
//! interview-collab snapshot <room-id>
//! interview-collab close <room-id>
//! interview-collab delete-docs <room-id>...
//! ```

use std::process::ExitCode;
use std::sync::Arc;

use interview_collab::{
    CollabConfig, CollabError, DeleteOutcome, DocumentLifecycleService, RoomId, RoomRepository,
    SnapshotExtractor, StoreConnectionManager,
};

const USAGE: &str = "usage: interview-collab <status | snapshot <room-id> | close <room-id> | delete-docs <room-id>...>";

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match run(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let config = CollabConfig::from_env()?;
    let connections = Arc::new(StoreConnectionManager::new(config));

    match args {
        [cmd] if cmd == "status" => {
            connections.start().await?;
            let docs = connections.document_store().await?;
            println!("room store:     {}", connections.config().room_store.path.display());
            println!("document store: {} (flush size {})", docs.path().display(), docs.flush_size());
        }
        [cmd, room] if cmd == "snapshot" => {
            let room_id: RoomId = room.parse()?;
            let snapshot = SnapshotExtractor::new(connections).extract_snapshot(room_id).await?;
            println!("language: {}", snapshot.language);
            println!("{}", snapshot.code);
        }
        [cmd, room] if cmd == "close" => {
            let room_id: RoomId = room.parse()?;
            let room = RoomRepository::new(connections).close_room(room_id).await?;
            println!("room {} is {:?}", room.id(), room.status());
        }
        [cmd, rooms @ ..] if cmd == "delete-docs" && !rooms.is_empty() => {
            let room_ids = rooms
                .iter()
                .map(|r| r.parse::<RoomId>())
                .collect::<Result<Vec<_>, _>>()?;
            let service = DocumentLifecycleService::new(connections);
            let mut failures = 0;
            for (room_id, result) in service.delete_documents(&room_ids).await {
                match result {
                    Ok(DeleteOutcome::Deleted) => println!("{room_id}: deleted"),
                    Ok(DeleteOutcome::Missing) => println!("{room_id}: no document"),
                    Err(e) => {
                        failures += 1;
                        println!("{room_id}: failed: {e}");
                    }
                }
            }
            if failures > 0 {
                return Err(Box::new(CollabError::StoreUnavailable(format!(
                    "{failures} of {} deletions failed",
                    room_ids.len()
                ))));
            }
        }
        _ => return Err(USAGE.into()),
    }

    Ok(())
}
