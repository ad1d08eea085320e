use std::time::Duration;

use shared::{
    error::FailureKind,
    status::{ChildState, InitStatus},
};
use store_core::{CoordinatorError, RootCoordinator, StaticEnvironment};

use super::*;

fn admin_page(permission_failures: u32) -> RootCoordinator<AdminPage> {
    RootCoordinator::new(
        DepsSnapshot::capture(&StaticEnvironment::at("/users")),
        Arc::new(DemoBackend::new(Duration::ZERO, permission_failures)),
    )
    .expect("admin page plan")
}

#[tokio::test]
async fn roles_wait_for_permissions_across_a_retry() {
    let root = admin_page(1);
    assert_eq!(root.stores().users.summary.get(), "loading users");

    let err = root.init().await.expect_err("permissions rejected once");
    assert!(matches!(
        err,
        CoordinatorError::ChildInit(ref child) if child.store == "permissions"
    ));
    assert_eq!(
        root.report().child("roles").map(|child| child.state),
        Some(ChildState::Failed(FailureKind::Skipped))
    );
    assert!(root.stores().roles.roles.get().is_empty());
    assert_eq!(root.stores().users.summary.get(), "3 users");

    root.retry().await.expect("retry");
    assert_eq!(root.status(), InitStatus::Ready);
    assert_eq!(root.stores().roles.roles.get(), vec!["viewer", "editor"]);
}

#[tokio::test]
async fn navigation_clears_the_selection() {
    let root = admin_page(0);
    root.init().await.expect("init");
    let selection = &root.stores().selection;

    selection.select("ada");
    assert!(!root.replace_deps(DepsSnapshot::capture(&StaticEnvironment::at("/users"))));
    assert_eq!(selection.selected.get().as_deref(), Some("ada"));

    assert!(root.replace_deps(DepsSnapshot::capture(&StaticEnvironment::at("/teams"))));
    assert_eq!(selection.selected.get(), None);
}

#[tokio::test]
async fn invite_updates_the_summary_and_rejects_duplicates() {
    let root = admin_page(0);
    root.init().await.expect("init");
    let users = &root.stores().users;

    assert!(users.invite("margaret").await);
    assert_eq!(users.summary.get(), "4 users");

    assert!(!users.invite("ada").await);
    assert_eq!(users.summary.get(), "4 users");
    assert_eq!(root.status(), InitStatus::Ready);
}
