use roll20_sandbox::{
    handler, wrappers, Args, BindingSource, CapabilityFn, CapabilityName, MatchOptions, ObjectKind,
    Payload, Ret, Sandbox, SandboxConfig, SandboxError, SandboxResult, Wrapper, SHEET_WORKER_COMPLETED,
};
use serde_json::{json, Map, Value};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

fn fields(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => panic!("expected object"),
    }
}

#[test]
fn test_character_lifecycle() {
    let sandbox = Sandbox::from_config(SandboxConfig::default()).unwrap();
    let caps = sandbox.capabilities();

    let hero = caps
        .create_obj(ObjectKind::Character, fields(json!({"name": "Ayla"})))
        .unwrap();

    let found = caps
        .find_objs(fields(json!({"_type": "character"})), MatchOptions::default())
        .unwrap();
    assert!(found.iter().any(|e| e.same_entity(&hero)));

    hero.remove().unwrap();
    assert!(!caps.get_all_objs().unwrap().iter().any(|e| e.same_entity(&hero)));
    assert!(matches!(hero.remove(), Err(SandboxError::NotRegistered(_))));
}

#[test]
fn test_send_chat_emulated_and_wrapped() {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let log = Rc::clone(&seen);
    let spy: Wrapper = Rc::new(move |_name: CapabilityName, inner: CapabilityFn| -> CapabilityFn {
        let log = Rc::clone(&log);
        Rc::new(move |args: &Args| {
            log.borrow_mut().push(format!("wrapper saw {} args", args.len()));
            inner(args)
        })
    });

    let sandbox = Sandbox::builder()
        .wrap(CapabilityName::SendChat, spy)
        .build()
        .unwrap();
    let caps = sandbox.capabilities();
    assert_eq!(
        caps.binding(CapabilityName::SendChat).unwrap().source,
        BindingSource::Emulated
    );

    let stub_log = Rc::clone(&seen);
    caps.on(
        "chat",
        handler(move |_: &[Payload]| stub_log.borrow_mut().push("chat fired".to_string())),
    )
    .unwrap();

    caps.send_chat("GM", "Roll for initiative").unwrap();

    assert_eq!(*seen.borrow(), vec!["wrapper saw 2 args", "chat fired"]);
}

#[test]
fn test_cascading_event_order() {
    let sandbox = Sandbox::from_config(SandboxConfig::default()).unwrap();
    let caps = sandbox.capabilities();
    let order = Rc::new(RefCell::new(Vec::new()));

    for channel in ["x", "z", "x:y"] {
        let order = Rc::clone(&order);
        caps.on(channel, handler(move |_| order.borrow_mut().push(channel)))
            .unwrap();
    }

    assert_eq!(sandbox.bus().publish("x:y", &[]), 2);
    assert_eq!(*order.borrow(), vec!["x:y", "x"]);
}

#[test]
fn test_sheet_worker_handlers_fire_once() {
    let sandbox = Sandbox::from_config(SandboxConfig::default()).unwrap();
    let caps = sandbox.capabilities();
    let count = Rc::new(Cell::new(0));

    for _ in 0..2 {
        let count = Rc::clone(&count);
        caps.on_sheet_worker_completed(handler(move |_| count.set(count.get() + 1)))
            .unwrap();
    }

    sandbox.bus().publish(SHEET_WORKER_COMPLETED, &[]);
    assert_eq!(count.get(), 2);
    sandbox.bus().publish(SHEET_WORKER_COMPLETED, &[]);
    assert_eq!(count.get(), 2);
}

#[test]
fn test_async_field_gate_through_surface() {
    let config = SandboxConfig::default().with_object(
        ObjectKind::Handout,
        fields(json!({"_id": "h1", "name": "Map", "notes": "X marks the spot"})),
    );
    let sandbox = Sandbox::from_config(config).unwrap();
    let handout = sandbox
        .capabilities()
        .get_obj(ObjectKind::Handout, "h1")
        .unwrap()
        .unwrap();

    assert!(matches!(
        handout.get("notes"),
        Err(SandboxError::ContinuationRequired { .. })
    ));

    let mut delivered = Vec::new();
    handout.get_async("notes", |value| delivered.push(value));
    assert_eq!(delivered, vec![json!("X marks the spot")]);
    assert_eq!(handout.get("name").unwrap(), json!("Map"));
}

#[test]
fn test_host_capability_with_validation_wrapper() {
    let host_calls = Rc::new(Cell::new(0));
    let calls = Rc::clone(&host_calls);
    let host_gm: CapabilityFn = Rc::new(move |_: &Args| -> SandboxResult<Ret> {
        calls.set(calls.get() + 1);
        Ok(Ret::Value(json!(true)))
    });

    let sandbox = Sandbox::builder()
        .host(roll20_sandbox::HostTable::new().with(CapabilityName::PlayerIsGm, host_gm))
        .wrap(CapabilityName::PlayerIsGm, wrappers::require_args(1))
        .build()
        .unwrap();
    let caps = sandbox.capabilities();

    assert!(caps.player_is_gm("anyone").unwrap());
    assert!(matches!(
        caps.call(CapabilityName::PlayerIsGm, vec![]),
        Err(SandboxError::BadArgument { .. })
    ));
    assert_eq!(host_calls.get(), 1);
}
