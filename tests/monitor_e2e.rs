use std::sync::{Arc, Mutex};

use serde_json::json;

use eventhub::configuration::{configuration_update_event, ConfigurationExtension};
use eventhub::monitor::{CallbackPolicy, MonitorConfig, MonitorContext, MonitorExtension};
use eventhub::{Event, EventHub, EventHubConfig, EventSource, EventType, SharedStateValue};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn snapshot(v: serde_json::Value) -> SharedStateValue {
    v.as_object().cloned().unwrap()
}

fn recorder(ctx: &MonitorContext) -> Arc<Mutex<Vec<SharedStateValue>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    ctx.register_configuration_callback(move |config| {
        sink.lock().unwrap().push(config.clone());
    });
    seen
}

fn campaign_response(i: i64) -> Event {
    Event::builder("Campaign Response", EventType::CAMPAIGN, EventSource::RESPONSE_CONTENT)
        .data(json!({ "i": i }))
        .build()
        .unwrap()
}

fn track(name: &str) -> Event {
    Event::builder(name, EventType::GENERIC_TRACK, EventSource::REQUEST_CONTENT)
        .build()
        .unwrap()
}

fn monitored_hub(ctx: &Arc<MonitorContext>) -> EventHub {
    init_tracing();
    let hub = EventHub::new(EventHubConfig::default()).unwrap();
    hub.register_extension(Box::new(ConfigurationExtension::new())).unwrap();
    hub.register_extension(Box::new(MonitorExtension::new(Arc::clone(ctx))))
        .unwrap();
    hub
}

#[test]
fn monitor_captures_topic_and_reports_configuration() {
    let ctx = Arc::new(MonitorContext::new());
    let seen = recorder(&ctx);
    let hub = monitored_hub(&ctx);

    hub.dispatch(track("A"));
    hub.flush().unwrap();
    assert!(seen.lock().unwrap().is_empty());

    // The update request, the state-change announcement and the
    // configuration response all resolve the snapshot.
    hub.dispatch(configuration_update_event(json!({"a": "1"})).unwrap());
    hub.flush().unwrap();
    {
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert!(seen.iter().all(|c| *c == snapshot(json!({"a": "1"}))));
    }

    let c = campaign_response(0);
    hub.dispatch(c.clone());
    hub.flush().unwrap();

    let captured = ctx.captured_events().snapshot();
    assert_eq!(captured.len(), 1);
    assert_eq!(captured[0].id, c.id);
    assert!(captured[0].number.is_some());
    assert_eq!(seen.lock().unwrap().len(), 4);
}

#[test]
fn once_policy_reports_first_configuration_only() {
    let ctx = Arc::new(MonitorContext::with_callback_policy(CallbackPolicy::Once));
    let seen = recorder(&ctx);
    let hub = monitored_hub(&ctx);

    hub.dispatch(track("A"));
    hub.dispatch(configuration_update_event(json!({"a": "1"})).unwrap());
    hub.flush().unwrap();
    assert_eq!(*seen.lock().unwrap(), vec![snapshot(json!({"a": "1"}))]);

    hub.dispatch(campaign_response(0));
    hub.flush().unwrap();

    assert_eq!(ctx.captured_events().len(), 1);
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[test]
fn callback_never_fires_without_configuration() {
    let ctx = Arc::new(MonitorContext::new());
    let seen = recorder(&ctx);
    let hub = monitored_hub(&ctx);

    for i in 0..20 {
        hub.dispatch(track(&format!("event-{i}")));
        hub.dispatch(campaign_response(i));
    }
    hub.flush().unwrap();

    assert!(seen.lock().unwrap().is_empty());
    assert_eq!(ctx.captured_events().len(), 20);
}

#[test]
fn empty_configuration_is_not_offered() {
    let ctx = Arc::new(MonitorContext::new());
    let seen = recorder(&ctx);
    let hub = monitored_hub(&ctx);

    hub.dispatch(configuration_update_event(json!({})).unwrap());
    hub.dispatch(track("after"));
    hub.flush().unwrap();

    assert!(seen.lock().unwrap().is_empty());
}

#[test]
fn latest_callback_registration_wins() {
    let ctx = Arc::new(MonitorContext::new());
    let first = recorder(&ctx);
    let second = recorder(&ctx);
    let hub = monitored_hub(&ctx);

    hub.dispatch(configuration_update_event(json!({"campaign.timeout": 5})).unwrap());
    hub.flush().unwrap();

    assert!(first.lock().unwrap().is_empty());
    let second = second.lock().unwrap();
    assert!(!second.is_empty());
    assert!(second.iter().all(|c| *c == snapshot(json!({"campaign.timeout": 5}))));
}

#[test]
fn captured_events_keep_arrival_order_and_reset_in_place() {
    let ctx = Arc::new(MonitorContext::new());
    let hub = monitored_hub(&ctx);
    let handle = ctx.captured_events();

    let events: Vec<Event> = (0..5).map(campaign_response).collect();
    for e in &events {
        hub.dispatch(e.clone());
    }
    hub.dispatch(track("not captured"));
    hub.flush().unwrap();

    let ids: Vec<_> = handle.snapshot().iter().map(|e| e.id).collect();
    assert_eq!(ids, events.iter().map(|e| e.id).collect::<Vec<_>>());
    handle.with(|list| {
        let numbers: Vec<u64> = list.iter().filter_map(|e| e.number).collect();
        assert!(numbers.windows(2).all(|w| w[0] < w[1]));
    });

    ctx.reset_captured_events();
    assert!(handle.is_empty());

    // Duplicates are kept.
    let again = campaign_response(99);
    hub.dispatch(again.clone());
    hub.dispatch(again.clone());
    hub.flush().unwrap();

    assert_eq!(handle.len(), 2);
    assert_eq!(handle.get(0).unwrap().id, again.id);
    assert_eq!(handle.get(1).unwrap().id, again.id);
}

#[test]
fn default_policy_fires_for_each_resolving_event() {
    let ctx = Arc::new(MonitorContext::new());
    assert_eq!(ctx.callback_policy(), CallbackPolicy::EveryResolution);
    let seen = recorder(&ctx);
    let hub = monitored_hub(&ctx);

    // Request, state-change announcement, response.
    hub.dispatch(configuration_update_event(json!({"a": "1"})).unwrap());
    hub.flush().unwrap();
    assert_eq!(seen.lock().unwrap().len(), 3);

    hub.dispatch(track("x"));
    hub.dispatch(track("y"));
    hub.dispatch(track("z"));
    hub.flush().unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 6);
    assert!(seen.iter().all(|c| *c == snapshot(json!({"a": "1"}))));
}

#[test]
fn default_policy_counts_shared_state_change_events() {
    init_tracing();
    let ctx = Arc::new(MonitorContext::default());
    let seen = recorder(&ctx);

    // Without a configuration extension only the published state and its
    // announcement reach the monitor.
    let hub = EventHub::new(EventHubConfig::default()).unwrap();
    hub.register_extension(Box::new(MonitorExtension::new(Arc::clone(&ctx))))
        .unwrap();
    hub.register_extension(Box::new(ConfigurationExtension::with_initial(snapshot(
        json!({"a": "1"}),
    ))))
    .unwrap();
    for name in ["x", "y", "z"] {
        hub.dispatch(track(name));
    }
    hub.flush().unwrap();

    assert_eq!(seen.lock().unwrap().len(), 4);
}

#[test]
fn reregistering_rearms_once_policy() {
    let ctx = Arc::new(MonitorContext::with_callback_policy(CallbackPolicy::Once));
    let first = recorder(&ctx);
    let hub = monitored_hub(&ctx);

    hub.dispatch(configuration_update_event(json!({"a": "1"})).unwrap());
    hub.flush().unwrap();
    assert_eq!(first.lock().unwrap().len(), 1);

    let second = recorder(&ctx);
    hub.dispatch(configuration_update_event(json!({"b": "2"})).unwrap());
    hub.flush().unwrap();

    assert_eq!(first.lock().unwrap().len(), 1);
    assert_eq!(
        *second.lock().unwrap(),
        vec![snapshot(json!({"a": "1", "b": "2"}))]
    );
}

#[test]
fn initial_configuration_registered_after_monitor_is_reported() {
    init_tracing();
    let ctx = Arc::new(MonitorContext::new());
    let seen = recorder(&ctx);

    let hub = EventHub::new(EventHubConfig::default()).unwrap();
    hub.register_extension(Box::new(MonitorExtension::new(Arc::clone(&ctx))))
        .unwrap();
    hub.register_extension(Box::new(ConfigurationExtension::with_initial(snapshot(
        json!({"global.privacy": "optedin"}),
    ))))
    .unwrap();
    hub.flush().unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![snapshot(json!({"global.privacy": "optedin"}))]
    );
}

#[test]
fn custom_capture_topic() {
    init_tracing();
    let ctx = Arc::new(MonitorContext::new());
    let config = MonitorConfig {
        capture_type: EventType::LIFECYCLE,
        capture_source: EventSource::RESPONSE_CONTENT,
        ..MonitorConfig::default()
    };

    let hub = EventHub::new(EventHubConfig::default()).unwrap();
    hub.register_extension(Box::new(MonitorExtension::with_config(Arc::clone(&ctx), config)))
        .unwrap();

    hub.dispatch(campaign_response(1));
    hub.dispatch(
        Event::builder("Lifecycle Start", EventType::LIFECYCLE, EventSource::RESPONSE_CONTENT)
            .build()
            .unwrap(),
    );
    hub.flush().unwrap();

    let captured = ctx.captured_events().snapshot();
    assert_eq!(captured.len(), 1);
    assert_eq!(captured[0].name, "Lifecycle Start");
}
