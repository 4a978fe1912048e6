use std::fmt;
use std::sync::Arc;

use dd_common::types::{DisplayEntry, Environment, ProxyHost, RawRecord};
use dd_resolver::resolve;
use dd_upstream::{ContainerSource, ProxyHostSource, UpstreamError};
use tokio::task::JoinSet;
use tracing::{error, warn};

/// Upstreams a refresh cycle reads from.
#[derive(Clone)]
pub struct Sources {
    pub containers: Arc<dyn ContainerSource>,
    /// `None` when no proxy manager is configured.
    pub proxy_hosts: Option<Arc<dyn ProxyHostSource>>,
}

/// State of the proxy host table for one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyTable {
    NotConfigured,
    Loaded(usize),
    /// Fetch failed; the cycle continued with an empty table.
    Unavailable(String),
}

impl fmt::Display for ProxyTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyTable::NotConfigured => write!(f, "not configured"),
            ProxyTable::Loaded(n) => write!(f, "{n} hosts"),
            ProxyTable::Unavailable(e) => write!(f, "unavailable ({e})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub environments: usize,
    pub entries: usize,
    /// Ids of environments whose container fetch failed.
    pub skipped_environments: Vec<String>,
    pub proxy_hosts: ProxyTable,
}

#[derive(Debug)]
pub struct CycleOutput {
    pub environments: Vec<Environment>,
    pub entries: Vec<DisplayEntry>,
    pub report: CycleReport,
}

/// One refresh cycle. Only an environment-list failure fails the cycle;
/// per-environment and proxy failures are absorbed and reported.
///
/// Environments whose container fetch fails are left out of the output
/// entirely, so every entry refers to a listed environment. Entry order
/// follows the upstream environment order, then container order.
pub async fn run_cycle(sources: &Sources) -> Result<CycleOutput, UpstreamError> {
    let (proxy, environments) = tokio::join!(
        load_proxy_table(sources.proxy_hosts.as_deref()),
        sources.containers.environments(),
    );
    let (proxy_hosts, proxy) = proxy;
    let environments = environments?;

    let mut fetched = fetch_containers(&sources.containers, &environments).await;

    let mut kept = Vec::with_capacity(environments.len());
    let mut entries = Vec::new();
    let mut skipped_environments = Vec::new();

    for (environment, records) in environments.into_iter().zip(fetched.iter_mut()) {
        let Some(records) = records.take() else {
            skipped_environments.push(environment.id.clone());
            continue;
        };
        entries.extend(
            records
                .iter()
                .filter_map(|record| resolve(record, &environment, proxy_hosts.as_deref())),
        );
        kept.push(environment);
    }

    let report = CycleReport {
        environments: kept.len(),
        entries: entries.len(),
        skipped_environments,
        proxy_hosts: proxy,
    };
    Ok(CycleOutput {
        environments: kept,
        entries,
        report,
    })
}

async fn load_proxy_table(
    source: Option<&dyn ProxyHostSource>,
) -> (Option<Vec<ProxyHost>>, ProxyTable) {
    let Some(source) = source else {
        return (None, ProxyTable::NotConfigured);
    };
    match source.proxy_hosts().await {
        Ok(hosts) => {
            let count = hosts.len();
            (Some(hosts), ProxyTable::Loaded(count))
        }
        Err(e) => {
            warn!("Proxy host fetch failed, continuing without proxy URLs: {e}");
            (Some(Vec::new()), ProxyTable::Unavailable(e.to_string()))
        }
    }
}

/// Fetch every environment's containers in parallel. Slot `i` holds the
/// records of `environments[i]`, or `None` if that fetch failed.
async fn fetch_containers(
    source: &Arc<dyn ContainerSource>,
    environments: &[Environment],
) -> Vec<Option<Vec<RawRecord>>> {
    let mut join_set = JoinSet::new();
    for (index, environment) in environments.iter().enumerate() {
        let source = Arc::clone(source);
        let environment_id = environment.id.clone();
        join_set.spawn(async move { (index, source.containers(&environment_id).await) });
    }

    let mut fetched = vec![None; environments.len()];
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((index, Ok(records))) => fetched[index] = Some(records),
            Ok((index, Err(e))) => {
                let environment = &environments[index];
                warn!(
                    environment = %environment.name,
                    id = %environment.id,
                    "Skipping environment, container fetch failed: {e}"
                );
            }
            Err(e) => error!("Container fetch task failed: {e}"),
        }
    }
    fetched
}
