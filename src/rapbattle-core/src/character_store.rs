//! Character storage.
//!
//! CRUD over the backend's `characters` table with a built-in fallback list
//! for when the backend has no such table or cannot be reached.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;

use crate::character::{Character, CharacterDraft};
use crate::error::{BackendError, BattleError};

/// Row-level access to stored characters.
#[async_trait]
pub trait CharacterBackend: Send + Sync {
    /// All characters, defaults first, newest first.
    async fn list(&self) -> Result<Vec<Character>, BackendError>;
    async fn insert(&self, draft: &CharacterDraft) -> Result<Character, BackendError>;
    async fn update(&self, id: &str, draft: &CharacterDraft) -> Result<Character, BackendError>;
    async fn delete(&self, id: &str) -> Result<(), BackendError>;
}

/// Error body returned by the REST backend.
#[derive(Debug, Default, Deserialize)]
struct RestErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Map an unsuccessful HTTP response to a backend error.
///
/// A missing relation (`42P01`, `PGRST205`, or a "does not exist" message)
/// is `NotFound`; everything else is `Transient`.
pub fn classify_error(status: StatusCode, body: &str) -> BackendError {
    let parsed: RestErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = parsed.message.clone().unwrap_or_else(|| body.to_string());

    let missing_table = matches!(parsed.code.as_deref(), Some("42P01") | Some("PGRST205"))
        || message.contains("does not exist");

    if missing_table {
        BackendError::NotFound(message)
    } else {
        BackendError::Transient(format!("{}: {}", status, message))
    }
}

/// PostgREST-style backend (`/rest/v1/<table>`).
pub struct RestBackend {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl RestBackend {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, BackendError> {
        if base_url.trim().is_empty() || api_key.trim().is_empty() {
            return Err(BackendError::NotConfigured(
                "backend URL and key are required".to_string(),
            ));
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| BackendError::NotConfigured(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/characters", self.base_url)
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response, BackendError> {
        let response = builder
            .send()
            .await
            .map_err(|e| BackendError::Transient(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_error(status, &body))
    }

    async fn single_row(response: reqwest::Response) -> Result<Character, BackendError> {
        let rows: Vec<Character> = response
            .json()
            .await
            .map_err(|e| BackendError::Transient(format!("unexpected response: {}", e)))?;
        rows.into_iter()
            .next()
            .ok_or_else(|| BackendError::Transient("no row returned".to_string()))
    }
}

#[async_trait]
impl CharacterBackend for RestBackend {
    async fn list(&self) -> Result<Vec<Character>, BackendError> {
        let url = format!(
            "{}?select=*&order=is_default.desc,created_at.desc",
            self.table_url()
        );
        let response = self.send(self.request(reqwest::Method::GET, &url)).await?;
        response
            .json()
            .await
            .map_err(|e| BackendError::Transient(format!("unexpected response: {}", e)))
    }

    async fn insert(&self, draft: &CharacterDraft) -> Result<Character, BackendError> {
        let builder = self
            .request(reqwest::Method::POST, &self.table_url())
            .header("Prefer", "return=representation")
            .json(&[draft]);
        Self::single_row(self.send(builder).await?).await
    }

    async fn update(&self, id: &str, draft: &CharacterDraft) -> Result<Character, BackendError> {
        let builder = self
            .request(reqwest::Method::PATCH, &self.table_url())
            .query(&[("id", format!("eq.{}", id))])
            .header("Prefer", "return=representation")
            .json(draft);
        Self::single_row(self.send(builder).await?).await
    }

    async fn delete(&self, id: &str) -> Result<(), BackendError> {
        let builder = self
            .request(reqwest::Method::DELETE, &self.table_url())
            .query(&[("id", format!("eq.{}", id))]);
        self.send(builder).await?;
        Ok(())
    }
}

/// Order characters: defaults first, then newest first. Stable.
pub fn sort_characters(characters: &mut [Character]) {
    characters.sort_by(|a, b| {
        b.is_default
            .cmp(&a.is_default)
            .then_with(|| b.created_at.cmp(&a.created_at))
    });
}

/// Cached character list backed by a [`CharacterBackend`].
pub struct CharacterStore {
    backend: Box<dyn CharacterBackend>,
    defaults: Vec<Character>,
    characters: Vec<Character>,
}

impl CharacterStore {
    /// `defaults` is served whenever the backend cannot provide characters.
    /// Every entry is flagged default, whatever its source says.
    pub fn new(backend: Box<dyn CharacterBackend>, defaults: Vec<Character>) -> Self {
        let defaults = defaults.into_iter().map(Character::as_default).collect();
        Self {
            backend,
            defaults,
            characters: Vec::new(),
        }
    }

    /// The currently cached list.
    pub fn characters(&self) -> &[Character] {
        &self.characters
    }

    /// Fetch the character list from the backend, falling back to the
    /// defaults on any backend failure.
    pub async fn refresh(&mut self) -> &[Character] {
        let mut characters = match self.backend.list().await {
            Ok(characters) => characters,
            Err(BackendError::NotFound(message)) => {
                tracing::warn!(%message, "characters table not found, using default characters");
                self.defaults.clone()
            }
            Err(e) => {
                tracing::error!(error = %e, "error fetching characters, falling back to defaults");
                self.defaults.clone()
            }
        };

        sort_characters(&mut characters);
        self.characters = characters;
        &self.characters
    }

    /// Validate and store a new character.
    pub async fn create(&mut self, draft: CharacterDraft) -> Result<Character, BattleError> {
        let draft = CharacterDraft {
            is_default: false,
            ..draft.validate()?
        };

        let created = self.backend.insert(&draft).await.map_err(mutation_error)?;
        tracing::info!(id = %created.id, name = %created.name, "character created");
        self.characters.insert(0, created.clone());
        Ok(created)
    }

    /// Validate and apply an edit. The default flag cannot be changed.
    pub async fn update(&mut self, id: &str, draft: CharacterDraft) -> Result<Character, BattleError> {
        let mut draft = draft.validate()?;
        if let Some(existing) = self.characters.iter().find(|c| c.id == id) {
            draft.is_default = existing.is_default;
        }

        let updated = self.backend.update(id, &draft).await.map_err(mutation_error)?;
        tracing::info!(id = %updated.id, "character updated");
        if let Some(slot) = self.characters.iter_mut().find(|c| c.id == id) {
            *slot = updated.clone();
        }
        Ok(updated)
    }

    /// Delete a character. Default characters cannot be deleted.
    pub async fn delete(&mut self, id: &str) -> Result<(), BattleError> {
        if self
            .characters
            .iter()
            .chain(self.defaults.iter())
            .any(|c| c.id == id && c.is_default)
        {
            return Err(BattleError::Validation(
                "Cannot delete default characters".to_string(),
            ));
        }

        self.backend.delete(id).await.map_err(mutation_error)?;
        tracing::info!(%id, "character deleted");
        self.characters.retain(|c| c.id != id);
        Ok(())
    }

    /// Look a character up by id, then exact name, then case-insensitive
    /// name.
    pub fn find(&self, key: &str) -> Option<&Character> {
        self.characters
            .iter()
            .find(|c| c.id == key)
            .or_else(|| self.characters.iter().find(|c| c.name == key))
            .or_else(|| {
                self.characters
                    .iter()
                    .find(|c| c.name.eq_ignore_ascii_case(key))
            })
    }
}

fn mutation_error(error: BackendError) -> BattleError {
    match error {
        BackendError::NotFound(_) => BattleError::ConfigError(
            "Database not properly configured. Please contact support.".to_string(),
        ),
        other => BattleError::Backend(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_characters;
    use chrono::{TimeZone, Utc};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct FakeState {
        rows: Vec<Character>,
        list_error: Option<BackendError>,
        mutation_error: Option<BackendError>,
        deleted: Vec<String>,
        next_id: u32,
    }

    #[derive(Clone, Default)]
    struct FakeBackend(Arc<Mutex<FakeState>>);

    #[async_trait]
    impl CharacterBackend for FakeBackend {
        async fn list(&self) -> Result<Vec<Character>, BackendError> {
            let state = self.0.lock().unwrap();
            match &state.list_error {
                Some(e) => Err(e.clone()),
                None => Ok(state.rows.clone()),
            }
        }

        async fn insert(&self, draft: &CharacterDraft) -> Result<Character, BackendError> {
            let mut state = self.0.lock().unwrap();
            if let Some(e) = &state.mutation_error {
                return Err(e.clone());
            }
            state.next_id += 1;
            let character = Character::new(format!("row-{}", state.next_id), draft.name.clone())
                .with_description(draft.description.clone());
            state.rows.push(character.clone());
            Ok(character)
        }

        async fn update(&self, id: &str, draft: &CharacterDraft) -> Result<Character, BackendError> {
            let mut state = self.0.lock().unwrap();
            if let Some(e) = &state.mutation_error {
                return Err(e.clone());
            }
            let row = state
                .rows
                .iter_mut()
                .find(|c| c.id == id)
                .ok_or_else(|| BackendError::Transient("no row".to_string()))?;
            row.name = draft.name.clone();
            row.is_default = draft.is_default;
            Ok(row.clone())
        }

        async fn delete(&self, id: &str) -> Result<(), BackendError> {
            let mut state = self.0.lock().unwrap();
            state.deleted.push(id.to_string());
            state.rows.retain(|c| c.id != id);
            Ok(())
        }
    }

    fn at(day: u32) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap()
    }

    fn draft(name: &str) -> CharacterDraft {
        CharacterDraft {
            name: name.to_string(),
            description: "Someone new".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_classify_missing_table() {
        let body = r#"{"code":"42P01","message":"relation \"public.characters\" does not exist"}"#;
        assert!(matches!(
            classify_error(StatusCode::NOT_FOUND, body),
            BackendError::NotFound(_)
        ));

        let body = r#"{"code":"PGRST205","message":"Could not find the table"}"#;
        assert!(matches!(
            classify_error(StatusCode::NOT_FOUND, body),
            BackendError::NotFound(_)
        ));
    }

    #[test]
    fn test_classify_other_errors_are_transient() {
        assert!(matches!(
            classify_error(StatusCode::INTERNAL_SERVER_ERROR, "oops"),
            BackendError::Transient(_)
        ));
        assert!(matches!(
            classify_error(StatusCode::UNAUTHORIZED, r#"{"message":"JWT expired"}"#),
            BackendError::Transient(_)
        ));
    }

    #[test]
    fn test_rest_backend_requires_configuration() {
        assert!(matches!(
            RestBackend::new("", "key"),
            Err(BackendError::NotConfigured(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_table_serves_defaults() {
        let backend = FakeBackend::default();
        backend.0.lock().unwrap().list_error = Some(BackendError::NotFound("42P01".to_string()));
        let mut store = CharacterStore::new(Box::new(backend), default_characters());

        let characters = store.refresh().await.to_vec();
        assert_eq!(characters.len(), 4);
        assert!(characters.iter().all(|c| c.is_default));
        assert_eq!(characters, default_characters_sorted(&store));
    }

    fn default_characters_sorted(store: &CharacterStore) -> Vec<Character> {
        let mut defaults = store.defaults.clone();
        sort_characters(&mut defaults);
        defaults
    }

    #[tokio::test]
    async fn test_transient_failure_serves_defaults() {
        let backend = FakeBackend::default();
        backend.0.lock().unwrap().list_error = Some(BackendError::Transient("timeout".to_string()));
        let mut store = CharacterStore::new(Box::new(backend), default_characters());
        assert_eq!(store.refresh().await.len(), 4);
    }

    #[tokio::test]
    async fn test_refresh_orders_and_is_idempotent() {
        let backend = FakeBackend::default();
        backend.0.lock().unwrap().rows = vec![
            Character::new("old", "Old").created_at(at(1)),
            Character::new("def", "Default").as_default().created_at(at(2)),
            Character::new("new", "New").created_at(at(5)),
        ];
        let mut store = CharacterStore::new(Box::new(backend), default_characters());

        let first: Vec<String> = store.refresh().await.iter().map(|c| c.id.clone()).collect();
        let second: Vec<String> = store.refresh().await.iter().map(|c| c.id.clone()).collect();
        assert_eq!(first, vec!["def", "new", "old"]);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_create_prepends_and_validates() {
        let backend = FakeBackend::default();
        let mut store = CharacterStore::new(Box::new(backend), default_characters());
        store.refresh().await;

        let created = store.create(draft("  MC Fresh ")).await.unwrap();
        assert_eq!(created.name, "MC Fresh");
        assert_eq!(store.characters()[0].id, created.id);

        assert!(matches!(
            store.create(draft("")).await,
            Err(BattleError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_create_against_missing_table_is_config_error() {
        let backend = FakeBackend::default();
        backend.0.lock().unwrap().mutation_error = Some(BackendError::NotFound("42P01".to_string()));
        let mut store = CharacterStore::new(Box::new(backend), default_characters());
        assert!(matches!(
            store.create(draft("MC")).await,
            Err(BattleError::ConfigError(_))
        ));
    }

    #[tokio::test]
    async fn test_update_keeps_default_flag() {
        let backend = FakeBackend::default();
        backend.0.lock().unwrap().rows = vec![Character::new("d", "Default").as_default()];
        let mut store = CharacterStore::new(Box::new(backend.clone()), Vec::new());
        store.refresh().await;

        let updated = store.update("d", draft("Renamed")).await.unwrap();
        assert_eq!(updated.name, "Renamed");
        assert!(updated.is_default);
        assert_eq!(store.characters()[0].name, "Renamed");
    }

    #[tokio::test]
    async fn test_configured_defaults_are_always_flagged() {
        let backend = FakeBackend::default();
        backend.0.lock().unwrap().list_error = Some(BackendError::NotFound("42P01".to_string()));
        let defaults = vec![
            Character::new("mc-one", "MC One").with_description("From a config file"),
            Character::new("mc-two", "MC Two").with_description("From a config file"),
        ];
        let mut store = CharacterStore::new(Box::new(backend.clone()), defaults);

        assert!(store.refresh().await.iter().all(|c| c.is_default));
        let result = store.delete("mc-two").await;
        assert!(matches!(result, Err(BattleError::Validation(_))));
        assert!(backend.0.lock().unwrap().deleted.is_empty());
    }

    #[tokio::test]
    async fn test_delete_refuses_defaults() {
        let backend = FakeBackend::default();
        backend.0.lock().unwrap().list_error = Some(BackendError::NotFound("42P01".to_string()));
        let mut store = CharacterStore::new(Box::new(backend.clone()), default_characters());
        store.refresh().await;

        let result = store.delete("batman-default").await;
        assert!(matches!(result, Err(BattleError::Validation(_))));
        assert!(backend.0.lock().unwrap().deleted.is_empty());
    }

    #[tokio::test]
    async fn test_delete_removes_custom_character() {
        let backend = FakeBackend::default();
        backend.0.lock().unwrap().rows = vec![Character::new("c1", "Custom")];
        let mut store = CharacterStore::new(Box::new(backend.clone()), default_characters());
        store.refresh().await;

        store.delete("c1").await.unwrap();
        assert!(store.characters().is_empty());
        assert_eq!(backend.0.lock().unwrap().deleted, vec!["c1"]);
    }

    #[tokio::test]
    async fn test_find_by_id_and_name() {
        let backend = FakeBackend::default();
        backend.0.lock().unwrap().list_error = Some(BackendError::NotFound("x".to_string()));
        let mut store = CharacterStore::new(Box::new(backend), default_characters());
        store.refresh().await;

        assert_eq!(store.find("shaggy-default").unwrap().name, "Shaggy");
        assert_eq!(store.find("Peter Griffin").unwrap().id, "peter-griffin-default");
        assert_eq!(store.find("batman").unwrap().id, "batman-default");
        assert!(store.find("Robin").is_none());
    }
}
