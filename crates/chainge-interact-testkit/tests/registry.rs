//! Interaction registry: lookup, listing, events and resuming from SQLite.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use serde_json::json;

use chainge_interact::{AgentConfig, InteractionError, InteractionEventKind, ListOptions};
use chainge_interact_core::{
    now_millis, CredentialRequest, CredentialRequirement, CredentialResponse, Message, Nonce,
    TokenBuilder, ValidationError, MAX_CLOCK_SKEW_MILLIS,
};
use chainge_interact_flow::FlowType;
use chainge_interact_store::SqliteTokenStore;
use chainge_interact_testkit::fixtures::UNUSED_CALLBACK;
use chainge_interact_testkit::{first_message, TestNetwork};

#[tokio::test]
async fn unknown_interaction_is_an_error() {
    let network = TestNetwork::new();
    let alice = network.party(1);

    let err = alice
        .manager()
        .get_interaction(&Nonce::random())
        .await
        .unwrap_err();
    assert!(matches!(err, InteractionError::NoSuchInteraction(_)));
}

#[tokio::test]
async fn listing_filters_orders_and_pages() -> Result<()> {
    let network = TestNetwork::new();
    let alice = network.party(1);

    let flows = [
        FlowType::Authentication,
        FlowType::Sign,
        FlowType::Authentication,
        FlowType::Resolution,
    ];
    let mut ids = Vec::new();
    for flow in flows {
        let (token, _) = alice.request(first_message(flow)).await?;
        ids.push(token.nonce().clone());
    }

    async fn listed(
        party: &chainge_interact_testkit::TestParty,
        options: ListOptions,
    ) -> Result<Vec<Nonce>> {
        let mut out = Vec::new();
        for shared in party.manager().list_interactions(&options).await? {
            out.push(shared.lock().await.id().clone());
        }
        Ok(out)
    }

    assert_eq!(listed(&alice, ListOptions::new()).await?, ids);
    assert_eq!(
        listed(&alice, ListOptions::new().flows(vec![FlowType::Authentication])).await?,
        vec![ids[0].clone(), ids[2].clone()]
    );
    assert_eq!(
        listed(&alice, ListOptions::new().reverse(true).skip(1).take(2)).await?,
        vec![ids[2].clone(), ids[1].clone()]
    );
    assert!(listed(&alice, ListOptions::new().flows(vec![FlowType::Decrypt]))
        .await?
        .is_empty());

    // evicted interactions come back from the log
    alice.manager().evict(&ids[1]);
    assert_eq!(listed(&alice, ListOptions::new().skip(1).take(1)).await?, vec![ids[1].clone()]);
    Ok(())
}

#[tokio::test]
async fn observers_run_in_registration_order() -> Result<()> {
    let network = TestNetwork::new();
    let alice = network.party(1);
    let bob = network.party(2);

    let log = Arc::new(Mutex::new(Vec::new()));
    for name in ["first", "second"] {
        let log = Arc::clone(&log);
        bob.agent
            .events()
            .subscribe(move |e| log.lock().unwrap().push((name, e.kind, e.message_count)));
    }

    let (request, _) = alice.request(first_message(FlowType::Authentication)).await?;
    let at_bob = bob.deliver(&request).await?;
    let response = at_bob
        .lock()
        .await
        .create_authentication_response(bob.ctx())
        .await?;
    bob.accept(&at_bob, &response).await?;

    assert_eq!(
        *log.lock().unwrap(),
        vec![
            ("first", InteractionEventKind::Created, 1),
            ("second", InteractionEventKind::Created, 1),
            ("first", InteractionEventKind::Updated, 2),
            ("second", InteractionEventKind::Updated, 2),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn interactions_resume_after_reopening_the_store() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("interact.db");
    let network = TestNetwork::new();
    let alice = network.party(1);

    let (request, response, summary) = {
        let bob = network.party_with(
            2,
            Arc::new(SqliteTokenStore::open(&path)?),
            AgentConfig::default(),
        );
        let (request, _) = alice.request(first_message(FlowType::Authentication)).await?;
        let at_bob = bob.deliver(&request).await?;
        let response = at_bob
            .lock()
            .await
            .create_authentication_response(bob.ctx())
            .await?;
        bob.accept(&at_bob, &response).await?;
        let summary = at_bob.lock().await.summary();
        (request, response, summary)
    };

    let bob = network.party_with(
        2,
        Arc::new(SqliteTokenStore::open(&path)?),
        AgentConfig::default(),
    );
    let resumed_events = Arc::new(Mutex::new(0usize));
    let counter = Arc::clone(&resumed_events);
    bob.agent.events().subscribe(move |e| {
        if e.kind == InteractionEventKind::Resumed {
            *counter.lock().unwrap() += 1;
        }
    });

    let resumed = bob.manager().get_interaction(request.nonce()).await?;
    let guard = resumed.lock().await;
    assert_eq!(guard.summary(), summary);
    assert_eq!(guard.last_message(), Some(&response));
    assert_eq!(*resumed_events.lock().unwrap(), 1);

    // a known nonce cannot be started again
    drop(guard);
    let err = bob.manager().start(&request, None).await.unwrap_err();
    assert!(matches!(err, InteractionError::InteractionExists(_)));
    Ok(())
}

#[tokio::test]
async fn resume_replays_at_the_receive_time() -> Result<()> {
    let network = TestNetwork::new();
    let verifier = network.party(1);
    let holder = network.party(2);
    let authority = network.party(3);

    let (request, _) = verifier
        .request(Message::CredentialRequest(CredentialRequest {
            callback_url: UNUSED_CALLBACK.into(),
            credential_requirements: vec![CredentialRequirement::new("dummy")],
        }))
        .await?;
    holder.deliver(&request).await?;

    let now = now_millis();
    let credential = authority
        .issue("dummy", holder.did(), json!({}), Some(now + 60_000))
        .await?;
    let response = || {
        TokenBuilder::reply(
            Message::CredentialResponse(CredentialResponse {
                supplied_credentials: vec![credential.clone()],
            }),
            &request,
        )
    };

    // dated a day ahead: refused outright
    let far = holder.sign(response().issued_at(now + 86_400_000)).await?;
    assert!(matches!(
        verifier.deliver(&far).await.unwrap_err(),
        InteractionError::InvalidToken(ValidationError::IssuedInFuture { .. })
    ));

    // dated past the credential expiry but within the skew allowance
    let ahead = holder
        .sign(response().issued_at(now + MAX_CLOCK_SKEW_MILLIS / 2))
        .await?;
    let live = verifier.deliver(&ahead).await?;
    let summary = live.lock().await.summary();
    assert_eq!(summary.message_count, 2);

    verifier.manager().evict(request.nonce());
    let resumed = verifier.manager().get_interaction(request.nonce()).await?;
    assert_eq!(resumed.lock().await.summary(), summary);

    verifier.manager().evict(request.nonce());
    let listed = verifier
        .manager()
        .list_interactions(&ListOptions::new().flows(vec![FlowType::CredentialShare]))
        .await?;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].lock().await.messages().len(), 2);
    Ok(())
}
