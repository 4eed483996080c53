//! Inventory command - resource kinds applied by a HelmRelease

use chartwatch_core::ResourceKind;
use chartwatch_kube::{HelmRelease, InventoryExtractor, KubeError, SecretRecordStore};
use console::style;
use kube::{Api, Client};

use crate::error::{CliError, Result};

/// Run the inventory command
pub async fn run(release: &str, namespace: &str, output_json: bool) -> Result<()> {
    let client = Client::try_default().await?;
    let api: Api<HelmRelease> = Api::namespaced(client.clone(), namespace);

    let helm_release = match api.get(release).await {
        Ok(helm_release) => helm_release,
        Err(kube::Error::Api(e)) if e.code == 404 => {
            return Err(CliError::not_found_with_help(
                format!("HelmRelease '{release}' not found in namespace '{namespace}'"),
                "check the name and pass the namespace with -n",
            ));
        }
        Err(e) => return Err(KubeError::from(e).into()),
    };

    let extractor = InventoryExtractor::new(SecretRecordStore::with_client(client));
    let kinds = extractor.release_inventory(&helm_release).await?;

    if output_json {
        let json = serde_json::to_string_pretty(&kinds).map_err(|e| CliError::Other {
            message: e.to_string(),
        })?;
        println!("{}", json);
        return Ok(());
    }

    if kinds.is_empty() {
        println!("HelmRelease {namespace}/{release} has no installed revision");
        return Ok(());
    }

    println!(
        "{:<40} {:<30}",
        style("API VERSION").bold(),
        style("KIND").bold()
    );
    for line in table_rows(&kinds) {
        println!("{}", line);
    }

    Ok(())
}

fn table_rows(kinds: &[ResourceKind]) -> Vec<String> {
    kinds
        .iter()
        .map(|kind| format!("{:<40} {:<30}", kind.api_version(), kind.kind))
        .collect()
}
