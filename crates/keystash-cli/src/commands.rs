use color_eyre::{
    eyre::{eyre, WrapErr},
    Result,
};
use keystash_core::PersistenceAdapter;
use keystash_store::RecordStore;
use serde_json::Value;

use crate::cli::{Command, PublicCommand};

pub const PASSWORD_ENV: &str = "KEYSTASH_PASSWORD";

/// Password from the flag, else from the environment.
pub fn resolve_password(flag: Option<String>) -> Option<String> {
    flag.or_else(|| std::env::var(PASSWORD_ENV).ok())
}

/// Execute a record command against an open store and return what to print.
pub async fn run<P: PersistenceAdapter>(
    cmd: &Command,
    store: &RecordStore<P>,
    password: Option<&str>,
) -> Result<String> {
    match cmd {
        Command::List => {
            let ids = store.ids().await;
            if ids.is_empty() {
                return Ok("No records yet. Add one with `keystash put <id> <json>`.\n".into());
            }
            Ok(ids.iter().map(|id| format!("{id}\n")).collect())
        }
        Command::Get { id } => {
            let value: Value = store.secret(id, require(password)?).await?;
            Ok(format!("{}\n", serde_json::to_string_pretty(&value)?))
        }
        Command::Put { id, json } => {
            let payload = parse_json(json)?;
            store.save_secret(id, require(password)?, &payload).await?;
            Ok(format!("Saved {id}\n"))
        }
        Command::Public(PublicCommand::Get { id }) => match store.public_data::<Value>(id).await? {
            Some(value) => Ok(format!("{}\n", serde_json::to_string_pretty(&value)?)),
            None => Ok(format!("{id} has no public data\n")),
        },
        Command::Public(PublicCommand::Set { id, json }) => {
            let payload = parse_json(json)?;
            store.save_public_data(id, &payload).await?;
            Ok(format!("Updated public data for {id}\n"))
        }
        Command::Remove { id } => {
            store.remove(id).await?;
            Ok(format!("Removed {id}\n"))
        }
        Command::Init | Command::Version | Command::Config(_) => {
            Err(eyre!("command does not operate on records"))
        }
    }
}

fn require(password: Option<&str>) -> Result<&str> {
    password.ok_or_else(|| eyre!("a password is required: pass --password or set {PASSWORD_ENV}"))
}

fn parse_json(raw: &str) -> Result<Value> {
    serde_json::from_str(raw).wrap_err("payload must be valid JSON")
}

#[cfg(test)]
mod tests {
    use keystash_core::InMemoryPersistence;
    use keystash_store::StoreOptions;

    use super::*;

    fn store() -> RecordStore<InMemoryPersistence> {
        RecordStore::new(
            InMemoryPersistence::new(),
            StoreOptions {
                iterations: 64,
                ..StoreOptions::default()
            },
        )
    }

    fn put(id: &str, json: &str) -> Command {
        Command::Put {
            id: id.into(),
            json: json.into(),
        }
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let store = store();
        run(&put("w", r#"{"privateKey":"k"}"#), &store, Some("pw"))
            .await
            .expect("put");

        let out = run(&Command::Get { id: "w".into() }, &store, Some("pw"))
            .await
            .expect("get");
        let value: Value = serde_json::from_str(&out).expect("json output");
        assert_eq!(value, serde_json::json!({ "privateKey": "k" }));

        let listed = run(&Command::List, &store, None).await.expect("list");
        assert_eq!(listed, "w\n");
    }

    #[tokio::test]
    async fn secret_commands_need_a_password() {
        let store = store();
        assert!(run(&put("w", "{}"), &store, None).await.is_err());
        assert!(store.ids().await.is_empty());
    }

    #[tokio::test]
    async fn invalid_json_is_rejected_before_saving() {
        let store = store();
        let err = run(&put("w", "{not json"), &store, Some("pw"))
            .await
            .expect_err("bad json");
        assert!(err.to_string().contains("valid JSON"));
        assert!(store.ids().await.is_empty());
    }

    #[tokio::test]
    async fn public_commands_respect_existing_records() {
        let store = store();
        let set = Command::Public(PublicCommand::Set {
            id: "w".into(),
            json: r#"{"publicKey":"pk"}"#.into(),
        });
        assert!(run(&set, &store, None).await.is_err());

        run(&put("w", "{}"), &store, Some("pw")).await.expect("put");
        run(&set, &store, None).await.expect("set public");
        let out = run(
            &Command::Public(PublicCommand::Get { id: "w".into() }),
            &store,
            None,
        )
        .await
        .expect("get public");
        assert!(out.contains("\"publicKey\": \"pk\""));
    }

    #[tokio::test]
    async fn list_hints_when_empty_and_remove_works() {
        let store = store();
        let out = run(&Command::List, &store, None).await.expect("list");
        assert!(out.starts_with("No records yet"));

        run(&put("w", "{}"), &store, Some("pw")).await.expect("put");
        run(&Command::Remove { id: "w".into() }, &store, None)
            .await
            .expect("remove");
        assert!(store.ids().await.is_empty());
    }
}
