//! Bootstrap sequencing.

use std::sync::Arc;

use rstest::rstest;

use crate::{BootstrapError, StaticConfigLoader, bootstrap_with};

use super::support::{HealthEvent, RecordingHealthReporter, Workspace};

#[rstest]
fn successful_bootstrap_reports_start_and_success() {
    let workspace = Workspace::new();
    let reporter = Arc::new(RecordingHealthReporter::default());

    let daemon = bootstrap_with(&StaticConfigLoader::new(workspace.config()), reporter.clone())
        .expect("bootstrap should succeed");

    assert_eq!(daemon.config().service(), "echo");
    assert_eq!(
        reporter.events(),
        [HealthEvent::BootstrapStarting, HealthEvent::BootstrapSucceeded]
    );
}

#[rstest]
fn invalid_configuration_is_reported_and_returned() {
    let workspace = Workspace::new();
    let reporter = Arc::new(RecordingHealthReporter::default());
    let loader = StaticConfigLoader::new(workspace.config().with_ctl_queue(0));

    let error = bootstrap_with(&loader, reporter.clone()).expect_err("bootstrap should fail");

    assert!(matches!(error, BootstrapError::Configuration { .. }));
    let events = reporter.events();
    assert_eq!(events.first(), Some(&HealthEvent::BootstrapStarting));
    assert!(matches!(events.last(), Some(HealthEvent::BootstrapFailed(_))));
}

#[rstest]
fn the_socket_directory_is_created_during_bootstrap() {
    let workspace = Workspace::new();
    let nested = workspace.root().join("run").join("altid.sock");
    let config = workspace
        .config()
        .with_ctl_socket(altid_config::SocketEndpoint::unix(nested.clone()));

    bootstrap_with(
        &StaticConfigLoader::new(config),
        Arc::new(RecordingHealthReporter::default()),
    )
    .expect("bootstrap should succeed");

    assert!(nested.parent().is_some_and(camino::Utf8Path::is_dir));
}
