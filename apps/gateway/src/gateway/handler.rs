//! Request flows that suspend on directory calls: REGISTER and CREATE_GROUP.

use parley_common::{GroupId, IdentityId};

use crate::error::GatewayError;

use super::events::{CreateGroupPayload, Event, RegisterPayload, RegistrationConfirmed};
use super::fanout::ConnectionHandle;
use super::hub::Hub;
use super::registry::BoundIdentity;
use super::session::GatewaySession;

const MAX_DISPLAY_NAME_LEN: usize = 64;
const MAX_GROUP_NAME_LEN: usize = 100;

/// Trimmed `value`, or `InvalidPayload` when it is empty or too long.
fn validate_name(field: &str, value: &str, max_len: usize) -> Result<String, GatewayError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(GatewayError::invalid(format!("{field} must not be empty")));
    }
    if trimmed.chars().count() > max_len {
        return Err(GatewayError::invalid(format!(
            "{field} must be at most {max_len} characters"
        )));
    }
    Ok(trimmed.to_string())
}

/// Process a REGISTER request: `Unbound -> Binding -> Bound`.
///
/// On any failure the session falls back to `Unbound` and nothing is pushed
/// to the connection except the caller's rejection.
pub async fn handle_register(
    hub: &Hub,
    session: &GatewaySession,
    handle: &ConnectionHandle,
    payload: RegisterPayload,
) -> Result<IdentityId, GatewayError> {
    let display_name =
        validate_name("display_name", &payload.display_name, MAX_DISPLAY_NAME_LEN)?;
    session.begin_binding()?;

    let result = bind(hub, session, handle, display_name, payload.claimed_id).await;
    if result.is_err() {
        session.abort_binding();
    }
    result
}

async fn bind(
    hub: &Hub,
    session: &GatewaySession,
    handle: &ConnectionHandle,
    display_name: String,
    claimed_id: Option<IdentityId>,
) -> Result<IdentityId, GatewayError> {
    let identity_id = hub
        .identities
        .resolve_or_register(&display_name, claimed_id.as_ref())
        .await?;

    match install(hub, session, handle, &identity_id, display_name).await {
        Ok(()) => Ok(identity_id),
        Err(error) => {
            // A fresh registration starts out online in the directory.
            if hub.sessions.lookup_connection(&identity_id).is_none() {
                mark_online(hub, &identity_id, false).await;
            }
            Err(error)
        }
    }
}

async fn install(
    hub: &Hub,
    session: &GatewaySession,
    handle: &ConnectionHandle,
    identity_id: &IdentityId,
    display_name: String,
) -> Result<(), GatewayError> {
    // The listing must succeed before anything is installed, so a failed
    // registration never leaves a half-bound connection behind.
    let mut users = hub.refresh_groups().await?;

    let superseded = session.while_binding(|| {
        hub.sessions.bind(
            handle.clone(),
            BoundIdentity {
                identity_id: identity_id.clone(),
                display_name: display_name.clone(),
            },
        )
    })?;
    session.complete_binding(identity_id.clone())?;

    if let Some(previous) = superseded {
        tracing::info!(
            identity_id = %identity_id,
            superseded = %previous,
            connection_id = %session.connection_id,
            "identity rebound to a newer connection"
        );
    }
    tracing::info!(
        identity_id = %identity_id,
        connection_id = %session.connection_id,
        display_name = %display_name,
        "connection bound"
    );

    // Presence follows the binding; the close path owns the reverse update.
    if mark_online(hub, identity_id, true).await {
        for user in users.iter_mut().filter(|u| &u.id == identity_id) {
            user.online = true;
        }
    }

    handle.deliver(Event::RegistrationConfirmed(RegistrationConfirmed {
        id: identity_id.clone(),
    }));
    hub.push_snapshots(&users);

    Ok(())
}

/// Best-effort presence update. Failures are logged and never block a flow.
///
/// Returns whether the directory applied the update.
pub async fn mark_online(hub: &Hub, identity_id: &IdentityId, online: bool) -> bool {
    match hub.identities.set_status(identity_id, online).await {
        Ok(true) => true,
        Ok(false) => {
            tracing::warn!(identity_id = %identity_id, online, "directory does not know identity");
            false
        }
        Err(error) => {
            tracing::warn!(identity_id = %identity_id, online, %error, "status update failed");
            false
        }
    }
}

/// Process a CREATE_GROUP request from a bound connection.
///
/// The creator is appended to the member list when missing. On success the
/// cache is refreshed and every live connection gets a new snapshot.
pub async fn handle_create_group(
    hub: &Hub,
    session: &GatewaySession,
    payload: CreateGroupPayload,
) -> Result<GroupId, GatewayError> {
    let creator = session.ensure_bound()?;
    let name = validate_name("name", &payload.name, MAX_GROUP_NAME_LEN)?;
    if payload.member_ids.is_empty() {
        return Err(GatewayError::invalid("member_ids must not be empty"));
    }

    let mut member_ids: Vec<IdentityId> = Vec::with_capacity(payload.member_ids.len() + 1);
    for id in payload.member_ids.into_iter().chain(std::iter::once(creator.clone())) {
        if !member_ids.contains(&id) {
            member_ids.push(id);
        }
    }

    let group_id = hub.group_directory.create(&name, &member_ids).await?;
    tracing::info!(
        group_id = %group_id,
        creator = %creator,
        members = member_ids.len(),
        "group created"
    );

    match hub.refresh_groups().await {
        Ok(users) => {
            hub.push_snapshots(&users);
        }
        Err(error) => {
            // The group exists; clients pick it up on the next successful refresh.
            tracing::warn!(group_id = %group_id, %error, "refresh after group creation failed");
        }
    }

    Ok(group_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{GroupDirectory, IdentityDirectory};
    use crate::gateway::hub::test_support::{connect, drain, hub};
    use crate::gateway::session::ConnectionState;
    use parley_common::ConnectionId;
    use std::time::Duration;

    fn register(name: &str) -> RegisterPayload {
        RegisterPayload {
            display_name: name.to_string(),
            claimed_id: None,
        }
    }

    fn session_and_handle(
        conn: &str,
    ) -> (
        GatewaySession,
        ConnectionHandle,
        tokio::sync::mpsc::UnboundedReceiver<Event>,
    ) {
        let id = ConnectionId::new(conn);
        let (handle, rx) = ConnectionHandle::new(id.clone());
        (GatewaySession::new(id), handle, rx)
    }

    #[tokio::test]
    async fn register_binds_confirms_and_pushes_a_snapshot() {
        let t = hub();
        let (session, handle, mut rx) = session_and_handle("c1");

        let id = handle_register(&t.hub, &session, &handle, register("alice"))
            .await
            .unwrap();

        assert_eq!(session.state(), ConnectionState::Bound(id.clone()));
        assert_eq!(
            t.hub.sessions.lookup_connection(&id).unwrap().id(),
            &ConnectionId::new("c1")
        );
        assert_eq!(t.identities.is_online(&id), Some(true));

        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0],
            Event::RegistrationConfirmed(RegistrationConfirmed { id: id.clone() })
        );
        let Event::ListSnapshot(snap) = &events[1] else {
            panic!("expected a list snapshot, got {:?}", events[1]);
        };
        assert_eq!(snap.users.len(), 1);
        assert_eq!(snap.users[0].id, id);
    }

    #[tokio::test]
    async fn registration_pushes_snapshots_to_everyone() {
        let t = hub();
        let bob = t.identities.register_user("bob").await.unwrap();
        let mut bob_rx = connect(&t.hub, "c-bob", &bob, "bob");

        let (session, handle, _rx) = session_and_handle("c-alice");
        handle_register(&t.hub, &session, &handle, register("alice"))
            .await
            .unwrap();

        let events = drain(&mut bob_rx);
        assert_eq!(events.len(), 1);
        let Event::ListSnapshot(snap) = &events[0] else {
            panic!("expected a list snapshot");
        };
        assert_eq!(snap.users.len(), 2);
    }

    #[tokio::test]
    async fn unreachable_directory_leaves_the_connection_unbound() {
        let t = hub();
        t.identities.set_available(false);
        let (session, handle, mut rx) = session_and_handle("c1");

        let err = handle_register(&t.hub, &session, &handle, register("alice"))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::DirectoryUnavailable(_)));
        assert_eq!(session.state(), ConnectionState::Unbound);
        assert!(drain(&mut rx).is_empty());
        assert_eq!(t.hub.sessions.view().live_count(), 0);
    }

    #[tokio::test]
    async fn second_register_is_rejected() {
        let t = hub();
        let (session, handle, _rx) = session_and_handle("c1");
        handle_register(&t.hub, &session, &handle, register("alice"))
            .await
            .unwrap();

        let err = handle_register(&t.hub, &session, &handle, register("alice"))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::AlreadyBound));
    }

    #[tokio::test]
    async fn blank_display_name_is_rejected_without_state_change() {
        let t = hub();
        let (session, handle, _rx) = session_and_handle("c1");
        let err = handle_register(&t.hub, &session, &handle, register("   "))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidPayload(_)));
        assert_eq!(session.state(), ConnectionState::Unbound);
    }

    #[tokio::test]
    async fn claimed_identity_is_reused() {
        let t = hub();
        let existing = t.identities.register_user("alice").await.unwrap();
        let (session, handle, _rx) = session_and_handle("c1");

        let payload = RegisterPayload {
            display_name: "alice".into(),
            claimed_id: Some(existing.clone()),
        };
        let id = handle_register(&t.hub, &session, &handle, payload).await.unwrap();
        assert_eq!(id, existing);
    }

    #[tokio::test]
    async fn closed_connection_cancels_registration() {
        let t = hub();
        let (session, handle, _rx) = session_and_handle("c1");
        session.close(|| ());

        let err = handle_register(&t.hub, &session, &handle, register("alice"))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Unbound));
        assert_eq!(t.hub.sessions.view().live_count(), 0);
    }

    async fn register_then_close_after(
        t: &crate::gateway::hub::test_support::TestHub,
        payload: RegisterPayload,
        close_after: Duration,
    ) -> Result<IdentityId, GatewayError> {
        let (session, handle, _rx) = session_and_handle("c1");
        let close = async {
            tokio::time::sleep(close_after).await;
            session.close(|| t.hub.sessions.unbind(&session.connection_id))
        };
        let (result, released) =
            tokio::join!(handle_register(&t.hub, &session, &handle, payload), close);
        assert!(released.is_none());
        result
    }

    #[tokio::test]
    async fn close_during_refresh_never_marks_identity_online() {
        let t = hub();
        let alice = t.identities.register_user("alice").await.unwrap();
        t.identities.set_status(&alice, false).await.unwrap();
        t.identities.set_latency(Duration::from_millis(200));

        // Resolve takes ~200ms, the listing ~200ms more; close lands in between.
        let payload = RegisterPayload {
            display_name: "alice".into(),
            claimed_id: Some(alice.clone()),
        };
        let err = register_then_close_after(&t, payload, Duration::from_millis(300))
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::Unbound));
        assert_eq!(t.hub.sessions.view().live_count(), 0);
        assert_eq!(t.identities.is_online(&alice), Some(false));
    }

    #[tokio::test]
    async fn cancelled_fresh_registration_is_reset_offline() {
        let t = hub();
        t.identities.set_latency(Duration::from_millis(200));

        let err = register_then_close_after(&t, register("alice"), Duration::from_millis(300))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Unbound));

        t.identities.set_latency(Duration::ZERO);
        let users = t.identities.list_users().await.unwrap();
        assert_eq!(users.len(), 1);
        assert!(!users[0].online);
    }

    #[tokio::test]
    async fn cancelled_registration_leaves_a_live_identity_online() {
        let t = hub();
        let alice = t.identities.register_user("alice").await.unwrap();
        let _live = connect(&t.hub, "c-live", &alice, "alice");
        t.identities.set_latency(Duration::from_millis(200));

        let payload = RegisterPayload {
            display_name: "alice".into(),
            claimed_id: Some(alice.clone()),
        };
        let err = register_then_close_after(&t, payload, Duration::from_millis(300))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Unbound));
        assert_eq!(t.identities.is_online(&alice), Some(true));
    }

    #[tokio::test]
    async fn create_group_adds_creator_and_broadcasts() {
        let t = hub();
        let bob = t.identities.register_user("bob").await.unwrap();
        let carol = t.identities.register_user("carol").await.unwrap();
        let mut carol_rx = connect(&t.hub, "c-carol", &carol, "carol");

        let (session, handle, mut alice_rx) = session_and_handle("c-alice");
        let alice = handle_register(&t.hub, &session, &handle, register("alice"))
            .await
            .unwrap();
        drain(&mut alice_rx);
        drain(&mut carol_rx);

        let payload = CreateGroupPayload {
            name: "trio".into(),
            member_ids: vec![bob.clone(), carol.clone(), bob.clone()],
        };
        let gid = handle_create_group(&t.hub, &session, payload).await.unwrap();

        let stored = t.groups.list_groups().await.unwrap();
        assert_eq!(stored[0].member_ids, vec![bob, carol.clone(), alice.clone()]);

        let snap = t.hub.groups.snapshot();
        assert!(snap.groups_containing(&alice).any(|g| g.id == gid));
        assert!(snap.groups_containing(&carol).any(|g| g.id == gid));

        for rx in [&mut alice_rx, &mut carol_rx] {
            let events = drain(rx);
            let Some(Event::ListSnapshot(snap)) = events.last() else {
                panic!("expected a list snapshot");
            };
            assert!(snap.groups.iter().any(|g| g.id == gid));
        }
    }

    #[tokio::test]
    async fn create_group_requires_a_bound_connection() {
        let t = hub();
        let (session, _handle, _rx) = session_and_handle("c1");
        let payload = CreateGroupPayload {
            name: "g".into(),
            member_ids: vec![IdentityId::new("x")],
        };
        let err = handle_create_group(&t.hub, &session, payload).await.unwrap_err();
        assert!(matches!(err, GatewayError::Unbound));
    }

    #[tokio::test]
    async fn create_group_validates_input() {
        let t = hub();
        let (session, handle, _rx) = session_and_handle("c1");
        handle_register(&t.hub, &session, &handle, register("alice"))
            .await
            .unwrap();

        let empty_members = CreateGroupPayload {
            name: "g".into(),
            member_ids: vec![],
        };
        assert!(matches!(
            handle_create_group(&t.hub, &session, empty_members).await,
            Err(GatewayError::InvalidPayload(_))
        ));

        let blank_name = CreateGroupPayload {
            name: " ".into(),
            member_ids: vec![IdentityId::new("x")],
        };
        assert!(matches!(
            handle_create_group(&t.hub, &session, blank_name).await,
            Err(GatewayError::InvalidPayload(_))
        ));
    }

    #[tokio::test]
    async fn create_group_surfaces_directory_failure() {
        let t = hub();
        let (session, handle, _rx) = session_and_handle("c1");
        handle_register(&t.hub, &session, &handle, register("alice"))
            .await
            .unwrap();
        t.groups.set_available(false);

        let payload = CreateGroupPayload {
            name: "g".into(),
            member_ids: vec![IdentityId::new("x")],
        };
        assert!(matches!(
            handle_create_group(&t.hub, &session, payload).await,
            Err(GatewayError::DirectoryUnavailable(_))
        ));
    }
}
