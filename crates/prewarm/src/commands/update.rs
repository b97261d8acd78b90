//! Update command
//!
//! Reads the source catalog, narrows it with the policy and filter, and
//! dispatches one transfer per pending tag through the proxy registry.

use anyhow::{Context, Result};
use camino::Utf8Path;
use prewarm_catalog::create_catalog_source;
use prewarm_core::types::{ArchSelection, Destination};
use prewarm_core::{Credentials, Error, ProxyTarget, RunConfig, Settings};
use prewarm_policy::{PolicyCompiler, PolicyDocument, SelectionFilter};
use prewarm_registry::LocalDistribution;
use prewarm_sync::{
    DispatchOptions, Dispatcher, LogConsolidator, ShutdownSignal, SkopeoLookup, SkopeoTransfer,
    TagStore,
};
use tracing::{info, warn};

use crate::cli::UpdateArgs;

pub async fn run(args: UpdateArgs, config_path: Option<&Utf8Path>) -> Result<()> {
    let settings = Settings::load(config_path).context("Failed to load settings")?;
    let config = build_run_config(args, settings)?;
    config.validate()?;
    execute(config, Box::pin(interrupted())).await
}

/// Merge command line options over the settings file
pub fn build_run_config(args: UpdateArgs, mut settings: Settings) -> Result<RunConfig> {
    if let Some(dir) = args.log_dir {
        settings.log_dir = dir;
    }
    if let Some(dir) = args.tag_store {
        settings.tag_store = dir;
    }
    if let Some(max) = args.max_requests {
        settings.max_requests = max;
    }
    if let Some(secs) = args.poll_interval {
        settings.poll_interval_secs = secs;
    }

    let registry_creds = read_credentials(args.registry_creds.as_deref(), "--registry-creds")?;
    let proxy_creds = read_credentials(args.proxy_creds.as_deref(), "--proxy-creds")?;
    let push_oci_creds = read_credentials(args.push_oci_creds.as_deref(), "--push-oci-creds")?;

    Ok(RunConfig {
        proxy: ProxyTarget::parse(&args.updatecache)?,
        from_registry: args.from,
        apply: args.apply,
        filter: args.filter,
        policy: args.filter_policy,
        skip_policy_sections: args.skip_policy_section,
        arches: ArchSelection::from_names(&args.arch)?,
        registry_creds,
        proxy_creds,
        destination: Destination::from_options(args.store_oci, args.push_oci, push_oci_creds)?,
        tls_verify_proxy: args.tls_verify_proxy,
        tls_verify_registry: args.tls_verify_registry,
        remove_signatures: args.remove_signatures,
        catalog_strategy: args.catalog_source,
        settings,
    })
}

fn read_credentials(value: Option<&str>, option: &str) -> Result<Option<Credentials>> {
    value
        .map(|v| Credentials::read(v).with_context(|| format!("Invalid {}", option)))
        .transpose()
}

/// Run one cache update until it completes or `shutdown` resolves
///
/// A local distribution registry started for the run is removed on every
/// exit path, including an interrupt while it is still starting.
pub async fn execute(config: RunConfig, mut shutdown: ShutdownSignal<'_>) -> Result<()> {
    let ProxyTarget::LocalDistribution { data_dir } = &config.proxy else {
        let proxy = config.proxy.to_string();
        return prime(&config, &proxy, config.tls_verify_proxy, &mut shutdown).await;
    };

    if config.is_dry_run() {
        // Nothing is transferred, so there is no need for a registry
        let proxy = config.proxy.to_string();
        return prime(&config, &proxy, false, &mut shutdown).await;
    }

    let mut registry = LocalDistribution::new(&config.settings.local_registry)
        .with_podman(&config.settings.tools.podman);
    let started = tokio::select! {
        started = registry.start(data_dir, &config.from_registry, config.registry_creds.as_ref()) => {
            Some(started)
        }
        _ = &mut shutdown => None,
    };

    let result = match started {
        Some(Ok(proxy)) => prime(&config, &proxy, false, &mut shutdown).await,
        Some(Err(e)) => Err(e).context("Failed to start local distribution registry"),
        None => {
            warn!("Interrupted while starting the local distribution registry");
            Err(Error::Interrupted.into())
        }
    };

    if let Err(e) = registry.stop().await {
        warn!("{}", e);
    }
    result
}

async fn prime(
    config: &RunConfig,
    proxy: &str,
    tls_verify_proxy: bool,
    shutdown: &mut ShutdownSignal<'_>,
) -> Result<()> {
    let settings = &config.settings;

    let selection = tokio::select! {
        selection = select_repositories(config) => selection?,
        _ = &mut *shutdown => return Err(Error::Interrupted.into()),
    };

    if config.is_dry_run() {
        info!("Proxy: [{}]:", proxy);
    }

    let store = TagStore::new(settings.tag_store.as_std_path());
    let lookup = SkopeoLookup::new(&config.from_registry, config.tls_verify_registry)
        .with_binaries(&settings.tools.skopeo, &settings.tools.podman)
        .with_credentials(config.registry_creds.clone());
    let transfer = SkopeoTransfer::new(proxy, config.destination.clone())
        .with_binary(&settings.tools.skopeo)
        .with_tls_verify(tls_verify_proxy)
        .with_credentials(config.proxy_creds.clone())
        .with_remove_signatures(config.remove_signatures);
    let options = DispatchOptions::new(settings.log_dir.as_std_path())
        .with_max_requests(settings.max_requests)
        .with_poll_interval(settings.poll_interval())
        .with_dry_run(config.is_dry_run());

    let arches = config.arches.job_arches();
    let outcome = Dispatcher::new(options, &store, &lookup, &transfer)
        .with_shutdown(&mut *shutdown)
        .run(&selection, &arches)
        .await;

    if !config.is_dry_run() {
        LogConsolidator::new(
            settings.log_dir.as_std_path(),
            settings.consolidated_log().as_std_path(),
        )
        .consolidate(&selection);
    }

    let report = outcome?;
    if config.is_dry_run() {
        info!("{} candidates, nothing transferred", report.candidates);
        return Ok(());
    }

    info!(
        "Transfers: {} started, {} succeeded, {} failed",
        report.admitted, report.succeeded, report.failed
    );
    if report.skipped > 0 {
        warn!("{} repository/arch pairs skipped, tags could not be read", report.skipped);
    }
    if report.failed > 0 {
        warn!("Failed transfer logs collected in {}", settings.consolidated_log());
    }
    Ok(())
}

/// Source catalog narrowed by the policy and the filter expression
async fn select_repositories(config: &RunConfig) -> Result<Vec<String>> {
    let settings = &config.settings;

    let source = create_catalog_source(
        config.catalog_strategy,
        &config.from_registry,
        config.tls_verify_registry,
        config.registry_creds.clone(),
        &settings.tools.podman,
    )?;
    info!(
        "Reading catalog of {} ({})",
        config.from_registry,
        source.name()
    );
    let repositories = source
        .list_repositories()
        .await
        .with_context(|| format!("Failed to read catalog of {}", config.from_registry))?;

    let policy = match &config.policy {
        Some(path) => {
            let document = PolicyDocument::load(path)?;
            let compiled = PolicyCompiler::new()
                .with_skip_sections(config.skip_policy_sections.iter().cloned())
                .with_allowed_arches(config.arches.allow_list())
                .compile(&document)?;
            info!("Policy {}: {} rules", path, compiled.len());
            Some(compiled)
        }
        None => None,
    };
    let filter = SelectionFilter::new(policy, config.filter.as_deref())?;

    let total = repositories.len();
    let selection = filter.apply(repositories);
    info!("Selected {} of {} repositories", selection.len(), total);
    Ok(selection)
}

/// Resolves on Ctrl-C; never resolves when the handler cannot be installed
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
