use clap::Parser;
use std::io;
use std::sync::Arc;

use card_eng::Engine;
use card_eng::config::Settings;
use card_eng::csv::{read_events, read_users, write_accounts};
use card_eng::engine::EngineSettings;
use card_eng::issuer::OfflineIssuer;
use card_eng::repository::Repository;
use card_eng::store::InMemoryStore;
use tokio_stream::wrappers::ReceiverStream;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("warn".parse().unwrap()))
        .with_writer(io::stderr)
        .init();

    let settings = Settings::parse();

    for path in [&settings.users, &settings.events] {
        if path.extension().is_none_or(|ext| ext != "csv") {
            warn!(path = %path.display(), "input file seems to not be a csv file");
        }
    }

    let mut store = InMemoryStore::new();
    for (key, value) in settings.threshold_config() {
        store = store.with_config(key, value);
    }
    for result in read_users(&settings.users).expect("failed to open users file") {
        match result {
            Ok((user, referral)) => store = store.with_user(user).with_referral(referral),
            Err(e) => warn!("{e}"),
        }
    }
    let store = Arc::new(store);

    let engine = Engine::new(
        store.clone(),
        Arc::new(OfflineIssuer),
        EngineSettings::default(),
    );

    let events = read_events(&settings.events).expect("failed to open events file");
    let (event_sender, event_receiver) = tokio::sync::mpsc::channel(16);

    tokio::spawn(async move {
        for result in events {
            match result {
                Ok(event) => {
                    if event_sender.send(event).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("{e}");
                }
            }
        }
    });

    engine.run(ReceiverStream::new(event_receiver)).await;

    let users = store.all_users().await.expect("in-memory store never fails reads");
    write_accounts(&users, io::stdout().lock()).expect("failed to write accounts");
}
