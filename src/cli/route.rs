//! CLI route: single route table and run context.

use crate::cli::output::{
    format_image_push, format_log, format_object, format_problems, format_pull, format_push,
    format_search_json, format_search_table, format_staged_images, format_status_json,
    format_status_text,
};
use crate::cli::parse::{Commands, ConfigCommands};
use crate::config::{global_config_path, ConfigLoader, ConfigOverrides, ConservatorConfig};
use crate::conservator::Conservator;
use crate::dataset::LocalDataset;
use crate::error::ApiError;
use crate::fields::FieldRequest;
use crate::types::CommitHash;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Seconds between processing polls after `push --wait`.
const WAIT_INTERVAL: Duration = Duration::from_secs(5);

/// Runtime context for CLI execution: working copy path and resolved config.
pub struct RunContext {
    path: PathBuf,
    config: ConservatorConfig,
}

impl RunContext {
    /// Resolves configuration for the working copy at `path`.
    pub fn new(
        path: PathBuf,
        config_path: Option<&Path>,
        overrides: &ConfigOverrides,
    ) -> Result<Self, ApiError> {
        let config = match config_path {
            Some(config_path) => ConfigLoader::load_from_file(config_path)?,
            None => ConfigLoader::load_with(Some(&path), overrides)?,
        };
        Ok(Self { path, config })
    }

    pub fn config(&self) -> &ConservatorConfig {
        &self.config
    }

    fn client(&self) -> Result<Conservator, ApiError> {
        Conservator::connect(self.config.clone())
    }

    fn open(&self, client: &Conservator) -> Result<LocalDataset, ApiError> {
        client.open_dataset(&self.path)
    }

    /// Execute a CLI command via the single route table.
    pub fn execute(&self, command: &Commands) -> Result<String, ApiError> {
        match command {
            Commands::Clone {
                identifier,
                dest,
                checkout,
            } => self.handle_clone(identifier, dest.as_deref(), checkout.as_deref()),
            Commands::Checkout { commit, yes } => self.handle_checkout(commit, *yes),
            Commands::Pull => {
                let client = self.client()?;
                let report = self.open(&client)?.pull()?;
                Ok(format_pull(&report))
            }
            Commands::Push { wait, timeout } => self.handle_push(*wait, *timeout),
            Commands::Add => {
                let client = self.client()?;
                let staged = self.open(&client)?.add_local_changes()?;
                Ok(format!("{} change(s) staged", staged))
            }
            Commands::Commit { message } => {
                let client = self.client()?;
                let commit = self.open(&client)?.commit(message, client.author())?;
                Ok(format!(
                    "[{}] {} ({} file(s))",
                    commit.hash.short(),
                    commit.message,
                    commit.tree.len()
                ))
            }
            Commands::Stage { paths } => {
                let client = self.client()?;
                let mut dataset = self.open(&client)?;
                let added = dataset.stage_local_images(paths)?;
                Ok(format!(
                    "Staged {} new image(s), {} total",
                    added,
                    dataset.get_staged_images().len()
                ))
            }
            Commands::Upload => {
                let client = self.client()?;
                let report = self.open(&client)?.push_staged_images()?;
                Ok(format_image_push(&report))
            }
            Commands::Staged => {
                let client = self.client()?;
                let dataset = self.open(&client)?;
                Ok(format_staged_images(dataset.get_staged_images()))
            }
            Commands::Validate { format } => {
                let client = self.client()?;
                let problems = self.open(&client)?.validate_index()?;
                format_problems(&problems, format)
            }
            Commands::Status { format } => {
                let client = self.client()?;
                let report = self.open(&client)?.status()?;
                if format == "json" {
                    format_status_json(&report)
                } else {
                    Ok(format_status_text(&report))
                }
            }
            Commands::Log { limit } => {
                let client = self.client()?;
                let mut commits = self.open(&client)?.log()?;
                if let Some(limit) = limit {
                    commits.truncate(*limit);
                }
                Ok(format_log(&commits))
            }
            Commands::Search {
                entity,
                text,
                fields,
                limit,
                count,
                format,
            } => self.handle_search(entity, text, fields, *limit, *count, format),
            Commands::Get {
                entity,
                identifier,
                fields,
                all,
            } => self.handle_get(entity, identifier, fields, *all),
            Commands::Config { command } => self.handle_config(command),
        }
    }

    fn handle_clone(
        &self,
        identifier: &str,
        dest: Option<&Path>,
        checkout: Option<&str>,
    ) -> Result<String, ApiError> {
        let dest = dest
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.path.join(identifier));
        let client = self.client()?;
        let mut dataset = client.clone_dataset(identifier, &dest)?;
        if let Some(commit) = checkout {
            let hash = resolve_commit(&dataset, commit)?;
            dataset.checkout(&hash, false)?;
        }
        info!(dataset_id = dataset.dataset_id(), "Clone complete");
        Ok(format!(
            "Cloned dataset {} into {} at {}",
            dataset.dataset_id(),
            dataset.root().display(),
            dataset
                .head()
                .map(|h| h.short())
                .unwrap_or_else(|| "empty history".to_string())
        ))
    }

    fn handle_checkout(&self, commit: &str, yes: bool) -> Result<String, ApiError> {
        let client = self.client()?;
        let mut dataset = self.open(&client)?;
        let hash = resolve_commit(&dataset, commit)?;

        let staged = dataset.index().staged.len();
        if staged > 0 && !yes {
            use dialoguer::Confirm;
            let confirmed = Confirm::new()
                .with_prompt(format!("Discard {} staged change(s)?", staged))
                .default(false)
                .interact()
                .map_err(|e| ApiError::ConfigError(format!("Failed to get user input: {}", e)))?;
            if !confirmed {
                return Ok("Checkout cancelled".to_string());
            }
        }

        dataset.checkout(&hash, true)?;
        Ok(format!("Checked out {}", hash.short()))
    }

    fn handle_push(&self, wait: bool, timeout: u64) -> Result<String, ApiError> {
        let client = self.client()?;
        let mut dataset = self.open(&client)?;
        let report = dataset.push_commits()?;
        let mut out = format_push(&report);
        if wait && report.commits > 0 {
            dataset.wait_for_processing(Duration::from_secs(timeout), WAIT_INTERVAL)?;
            out.push_str("\nRemote processing complete");
        }
        Ok(out)
    }

    fn handle_search(
        &self,
        entity: &str,
        text: &str,
        fields: &[String],
        limit: Option<usize>,
        count: bool,
        format: &str,
    ) -> Result<String, ApiError> {
        let client = self.client()?;
        let manager = client.manager(entity)?;
        if count {
            return Ok(manager.count(text)?.to_string());
        }

        let mut query = manager.search(text)?;
        let columns: Vec<String> = if fields.is_empty() {
            manager.entity().default_fields.iter().map(|f| f.to_string()).collect()
        } else {
            let mut columns = vec!["id".to_string()];
            columns.extend(fields.iter().filter(|f| f.as_str() != "id").cloned());
            query = query.with_fields(FieldRequest::create(columns.iter())?);
            columns
        };
        if let Some(limit) = limit {
            query = query.first(limit);
        }

        let items = query.collect_all()?;
        if format == "json" {
            format_search_json(&items)
        } else {
            Ok(format_search_table(&items, &columns))
        }
    }

    fn handle_get(
        &self,
        entity: &str,
        identifier: &str,
        fields: &[String],
        all: bool,
    ) -> Result<String, ApiError> {
        let client = self.client()?;
        let manager = client.manager(entity)?;
        let mut proxy = manager.from_string(identifier)?;
        if all {
            proxy.populate_all()?;
        } else if fields.is_empty() {
            proxy.populate(&manager.default_fields()?)?;
        } else {
            proxy.populate(&FieldRequest::create(fields.iter())?)?;
        }
        format_object(&proxy)
    }

    fn handle_config(&self, command: &ConfigCommands) -> Result<String, ApiError> {
        match command {
            ConfigCommands::Show => {
                let mut shown = self.config.clone();
                shown.api_key = shown.api_key.map(|k| mask(&k));
                shown.to_toml()
            }
            ConfigCommands::Path => Ok(global_config_path()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "No home directory; user config unavailable".to_string())),
            ConfigCommands::Set => {
                use dialoguer::{Input, Password};
                let prompt_error =
                    |e: dialoguer::Error| ApiError::ConfigError(format!("Failed to get user input: {}", e));

                let path = global_config_path().ok_or_else(|| {
                    ApiError::ConfigError("No home directory for the user config".to_string())
                })?;
                let mut config = self.config.clone();
                config.url = Input::new()
                    .with_prompt("Conservator URL")
                    .default(config.url.clone())
                    .interact_text()
                    .map_err(prompt_error)?;
                let email: String = Input::new()
                    .with_prompt("Email")
                    .default(config.email.clone().unwrap_or_default())
                    .allow_empty(true)
                    .interact_text()
                    .map_err(prompt_error)?;
                config.email = Some(email).filter(|e| !e.trim().is_empty());
                let key = Password::new()
                    .with_prompt("API key")
                    .interact()
                    .map_err(prompt_error)?;
                config.api_key = Some(key);

                config.ensure_valid()?;
                config.save(&path)?;
                Ok(format!("Saved {}", path.display()))
            }
        }
    }
}

/// Resolves a full hash or a unique prefix against the local history.
pub fn resolve_commit(dataset: &LocalDataset, reference: &str) -> Result<CommitHash, ApiError> {
    if let Ok(hash) = reference.parse::<CommitHash>() {
        return Ok(hash);
    }
    let prefix = reference.to_ascii_lowercase();
    let mut matches: Vec<CommitHash> = dataset
        .log()?
        .into_iter()
        .map(|c| c.hash)
        .filter(|h| h.to_hex().starts_with(&prefix))
        .collect();
    match matches.len() {
        0 => Err(ApiError::CommitNotFound(reference.to_string())),
        1 => Ok(matches.remove(0)),
        _ => Err(ApiError::AmbiguousIdentifier(reference.to_string())),
    }
}

fn mask(key: &str) -> String {
    let visible: String = key.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect();
    format!("****{}", visible)
}
