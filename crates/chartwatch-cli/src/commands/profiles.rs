//! Profiles command - read the cached profiles of a HelmRepository

use chartwatch_core::{
    CacheBackend, ChartProfile, ChartReference, ObjectKey, RepositorySnapshot, WatcherConfig,
};
use chartwatch_kube::{CancelSignal, HelmRepository, ReconcileOutcome, RepositoryReconciler};
use chartwatch_repo::{HttpRepoManager, ProfileCache, RepoError};
use console::style;
use kube::{Api, Client};
use std::io::Write;
use std::sync::Arc;

use super::open_cache;
use crate::error::{CliError, Result};

/// Run the profiles command
pub async fn run(
    config: &WatcherConfig,
    repository: &str,
    refresh: bool,
    values: Option<&str>,
    output_json: bool,
) -> Result<()> {
    let key: ObjectKey = repository.parse()?;
    let cache = open_cache(config)?;

    // a memory cache starts empty in every process
    if refresh || config.cache == CacheBackend::Memory {
        refresh_from_cluster(config, &key, cache.clone()).await?;
    }

    if let Some(reference) = values {
        let reference = parse_reference(reference)?;
        let payload = cache
            .get_profile_values(&key, &reference.chart, &reference.version)
            .await?;
        std::io::stdout().write_all(&payload)?;
        return Ok(());
    }

    let snapshot = cache.get(&key).await?.ok_or_else(|| RepoError::CacheMiss {
        key: key.to_string(),
    })?;

    if output_json {
        let json = serde_json::to_string_pretty(&serde_json::json!({
            "profiles": snapshot.profiles,
            "unavailable": snapshot.unavailable,
        }))
        .map_err(|e| CliError::Other {
            message: e.to_string(),
        })?;
        println!("{}", json);
        return Ok(());
    }

    print_snapshot(&key, &snapshot);
    Ok(())
}

async fn refresh_from_cluster(
    config: &WatcherConfig,
    key: &ObjectKey,
    cache: Arc<dyn ProfileCache>,
) -> Result<()> {
    let client = Client::try_default().await?;
    let api: Api<HelmRepository> = Api::namespaced(client, &key.namespace);
    let repository = match api.get(&key.name).await {
        Ok(repository) => repository,
        Err(kube::Error::Api(e)) if e.code == 404 => {
            return Err(CliError::not_found_with_help(
                format!("HelmRepository '{key}' not found"),
                "use the form <namespace>/<name>",
            ));
        }
        Err(e) => return Err(e.into()),
    };

    let manager = Arc::new(HttpRepoManager::new(config.http_timeout)?);
    let reconciler = RepositoryReconciler::from_config(manager, cache, config);
    if reconciler.reconcile(&repository, &CancelSignal::never()).await? == ReconcileOutcome::NotReady {
        eprintln!(
            "{} HelmRepository {} has no artifact yet",
            style("!").yellow(),
            key
        );
    }
    Ok(())
}

fn parse_reference(input: &str) -> Result<ChartReference> {
    match input.rsplit_once('@') {
        Some((chart, version)) if !chart.is_empty() && !version.is_empty() => {
            Ok(ChartReference::new(chart, version))
        }
        _ => Err(CliError::input_with_help(
            format!("'{input}' is not a chart reference"),
            "use the form <chart>@<version>",
        )),
    }
}

fn print_snapshot(key: &ObjectKey, snapshot: &RepositorySnapshot) {
    if snapshot.profiles.is_empty() {
        println!("No profiles found in {}", key);
        return;
    }

    println!(
        "{:<30} {:<12} {:<10} {}",
        style("NAME").bold(),
        style("LATEST").bold(),
        style("VERSIONS").bold(),
        style("DESCRIPTION").bold()
    );
    for profile in &snapshot.profiles {
        println!("{}", profile_row(profile));
    }

    if !snapshot.unavailable.is_empty() {
        println!();
        println!(
            "{} values could not be fetched for:",
            style("Warning:").yellow().bold()
        );
        for reference in &snapshot.unavailable {
            println!("  {}", reference);
        }
    }
}

fn profile_row(profile: &ChartProfile) -> String {
    format!(
        "{:<30} {:<12} {:<10} {}",
        profile.name,
        profile.latest_version().unwrap_or("-"),
        profile.available_versions.len(),
        profile.description.as_deref().unwrap_or("")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reference() {
        let reference = parse_reference("weave-gitops@0.2.0").unwrap();
        assert_eq!(reference, ChartReference::new("weave-gitops", "0.2.0"));

        assert!(parse_reference("weave-gitops").is_err());
        assert!(parse_reference("@0.2.0").is_err());
        assert!(parse_reference("weave-gitops@").is_err());
    }

    #[test]
    fn test_profile_row() {
        let row = profile_row(&ChartProfile {
            name: "weave-gitops".to_string(),
            description: Some("GitOps dashboard".to_string()),
            available_versions: vec!["0.2.0".to_string(), "0.1.0".to_string()],
            ..Default::default()
        });
        assert!(row.starts_with("weave-gitops"));
        assert!(row.contains("0.2.0"));
        assert!(row.ends_with("GitOps dashboard"));
    }
}
