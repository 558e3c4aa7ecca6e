//! Property-based tests for the relay driver.
//!
//! These verify the presence invariants that must hold for all event
//! sequences: the core drives a `RelayDriver` with arbitrary interleavings
//! of connect/create/join/send/disconnect and compares the registry-derived
//! state against an independent naive model after every step.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
};

use huddle_core::{
    ClientEvent, Environment, MemoryStore, RelayAction, RelayDriver, RelayEvent, RoomCode,
    ServerEvent,
};
use proptest::prelude::*;
use rand::{RngCore, SeedableRng, rngs::StdRng};

#[derive(Clone)]
struct SeededEnv {
    rng: Arc<Mutex<StdRng>>,
    clock: Arc<AtomicU64>,
}

impl SeededEnv {
    fn with_seed(seed: u64) -> Self {
        Self {
            rng: Arc::new(Mutex::new(StdRng::seed_from_u64(seed))),
            clock: Arc::new(AtomicU64::new(1_700_000_000_000)),
        }
    }
}

impl Environment for SeededEnv {
    fn now_millis(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        #[allow(clippy::unwrap_used)]
        self.rng.lock().unwrap().fill_bytes(buffer);
    }
}

/// One scripted step against the driver.
#[derive(Debug, Clone)]
enum Op {
    Open(u64),
    Create { conn: u64, name: String },
    Join { conn: u64, name: String, room: String },
    Send { conn: u64, text: String },
    Typing { conn: u64, name: String },
    Close(u64),
}

/// Fixed pool of joinable room codes so sequences actually collide.
const ROOM_POOL: [&str; 4] = ["AAAAAA", "BBBBBB", "CCCCCC", "DDDDDD"];

fn op_strategy() -> impl Strategy<Value = Op> {
    let conn = 0u64..6;
    let name = prop::sample::select(vec!["alice", "bob", "carol", "dave (Guest)"]);
    let room = prop::sample::select(ROOM_POOL.to_vec());

    prop_oneof![
        conn.clone().prop_map(Op::Open),
        (conn.clone(), name.clone())
            .prop_map(|(conn, name)| Op::Create { conn, name: name.to_string() }),
        (conn.clone(), name.clone(), room).prop_map(|(conn, name, room)| Op::Join {
            conn,
            name: name.to_string(),
            room: room.to_string(),
        }),
        (conn.clone(), "[a-z]{1,8}").prop_map(|(conn, text)| Op::Send { conn, text }),
        (conn.clone(), name).prop_map(|(conn, name)| Op::Typing { conn, name: name.to_string() }),
        conn.prop_map(Op::Close),
    ]
}

/// Naive mirror of what the registry should contain.
#[derive(Default)]
struct Model {
    // conn -> (name, room)
    conns: BTreeMap<u64, (Option<String>, Option<String>)>,
}

impl Model {
    fn users_in_room(&self, room: &str) -> BTreeSet<String> {
        self.conns
            .values()
            .filter(|(_, r)| r.as_deref() == Some(room))
            .filter_map(|(name, _)| name.clone())
            .collect()
    }

    fn live_rooms(&self) -> BTreeSet<String> {
        self.conns.values().filter_map(|(_, room)| room.clone()).collect()
    }
}

/// Room code minted by a create, read back from the reply action.
fn minted_room(actions: &[RelayAction]) -> Option<String> {
    actions.iter().find_map(|action| match action {
        RelayAction::SendToConnection { event: ServerEvent::RoomJoined { room, .. }, .. } => {
            Some(room.to_string())
        },
        _ => None,
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// Properties, checked after every step of every sequence:
    ///
    /// - the registry's view of a room's occupants always equals the
    ///   deduplicated names of the model's live connections in that room
    /// - every room-count broadcast carries the number of distinct rooms
    ///   with at least one live connection
    /// - typing broadcasts always exclude the emitter
    /// - messages from roomless connections are never persisted or
    ///   broadcast
    #[test]
    fn registry_matches_model_for_all_sequences(
        seed in any::<u64>(),
        ops in prop::collection::vec(op_strategy(), 1..60),
    ) {
        let mut driver = RelayDriver::new(SeededEnv::with_seed(seed), MemoryStore::new());
        let mut model = Model::default();

        for op in ops {
            let actions = match op {
                Op::Open(conn) => {
                    let actions =
                        driver.process_event(RelayEvent::ConnectionOpened { conn_id: conn });
                    model.conns.entry(conn).or_insert((None, None));
                    actions
                },
                Op::Create { conn, name } => {
                    let actions = driver.process_event(RelayEvent::ClientEvent {
                        conn_id: conn,
                        event: ClientEvent::CreateRoom { display_name: name.clone() },
                    });
                    if model.conns.contains_key(&conn) {
                        let room = minted_room(&actions);
                        prop_assert!(room.is_some(), "create must reply with room-joined");
                        model.conns.insert(conn, (Some(name), room));
                    }
                    actions
                },
                Op::Join { conn, name, room } => {
                    let actions = driver.process_event(RelayEvent::ClientEvent {
                        conn_id: conn,
                        event: ClientEvent::JoinRoom {
                            display_name: name.clone(),
                            room: room.clone(),
                        },
                    });
                    if model.conns.contains_key(&conn) {
                        model.conns.insert(conn, (Some(name), Some(room)));
                    }
                    actions
                },
                Op::Send { conn, text } => {
                    let persisted_before = driver.store().message_count();
                    let in_room = model
                        .conns
                        .get(&conn)
                        .is_some_and(|(_, room)| room.is_some());

                    let actions = driver.process_event(RelayEvent::ClientEvent {
                        conn_id: conn,
                        event: ClientEvent::SendMessage { sender: "x".to_string(), text },
                    });

                    let broadcast = actions.iter().any(|a| {
                        matches!(
                            a,
                            RelayAction::BroadcastToRoom {
                                event: ServerEvent::ReceiveMessage { .. },
                                ..
                            }
                        )
                    });
                    let persisted_after = driver.store().message_count();

                    if model.conns.contains_key(&conn) && in_room {
                        prop_assert!(broadcast);
                        prop_assert_eq!(persisted_after, persisted_before + 1);
                    } else {
                        prop_assert!(!broadcast, "roomless send must not broadcast");
                        prop_assert_eq!(persisted_after, persisted_before);
                    }
                    actions
                },
                Op::Typing { conn, name } => {
                    let actions = driver.process_event(RelayEvent::ClientEvent {
                        conn_id: conn,
                        event: ClientEvent::Typing { display_name: name },
                    });
                    for action in &actions {
                        if let RelayAction::BroadcastToRoom {
                            event: ServerEvent::Typing { .. },
                            exclude,
                            ..
                        } = action
                        {
                            prop_assert_eq!(
                                *exclude,
                                Some(conn),
                                "typing must exclude the emitter"
                            );
                        }
                    }
                    actions
                },
                Op::Close(conn) => {
                    let actions = driver.process_event(RelayEvent::ConnectionClosed {
                        conn_id: conn,
                        reason: "scripted".to_string(),
                    });
                    model.conns.remove(&conn);
                    actions
                },
            };

            // Every count broadcast must match the derived live-room count.
            for action in &actions {
                if let RelayAction::BroadcastToAll {
                    event: ServerEvent::RoomCountUpdate { count },
                } = action
                {
                    prop_assert_eq!(*count, model.live_rooms().len());
                    prop_assert_eq!(*count, driver.registry().active_room_count());
                }
            }

            // Presence invariant: registry-derived occupants equal the model
            // for every room either side knows about.
            let mut rooms: BTreeSet<String> = model.live_rooms();
            rooms.extend(ROOM_POOL.iter().map(ToString::to_string));
            for room in rooms {
                let code = RoomCode::parse(&room);
                prop_assert!(code.is_ok());
                let Ok(code) = code else { unreachable!() };
                let derived: BTreeSet<String> =
                    driver.registry().users_in_room(&code).into_iter().collect();
                prop_assert_eq!(derived, model.users_in_room(&room));
            }
        }
    }

    /// Joining a room that has never existed succeeds with empty history,
    /// for every syntactically valid code.
    #[test]
    fn prop_join_unknown_room_replays_empty(
        seed in any::<u64>(),
        code in "[0-9A-Z]{6}",
    ) {
        let mut driver = RelayDriver::new(SeededEnv::with_seed(seed), MemoryStore::new());
        driver.process_event(RelayEvent::ConnectionOpened { conn_id: 1 });

        let actions = driver.process_event(RelayEvent::ClientEvent {
            conn_id: 1,
            event: ClientEvent::JoinRoom {
                display_name: "alice".to_string(),
                room: code.clone(),
            },
        });

        let joined = actions.iter().any(|a| matches!(
            a,
            RelayAction::SendToConnection {
                event: ServerEvent::RoomJoined { messages, .. },
                ..
            } if messages.is_empty()
        ));
        prop_assert!(joined, "join of unknown room {} must replay empty history", code);

        let errored = actions.iter().any(|a| {
            matches!(a, RelayAction::SendToConnection { event: ServerEvent::RoomError { .. }, .. })
        });
        prop_assert!(!errored);
    }

    /// Guests can never delete a room, whatever their prefix looks like.
    #[test]
    fn prop_guest_delete_always_rejected(
        seed in any::<u64>(),
        prefix in "[a-zA-Z0-9 ]{0,12}",
    ) {
        let guest = format!("{prefix}(Guest)");
        let mut driver = RelayDriver::new(SeededEnv::with_seed(seed), MemoryStore::new());
        driver.process_event(RelayEvent::ConnectionOpened { conn_id: 1 });

        let actions = driver.process_event(RelayEvent::ClientEvent {
            conn_id: 1,
            event: ClientEvent::DeleteRoom {
                room: "ABC123".to_string(),
                display_name: guest,
            },
        });

        prop_assert!(
            matches!(
                actions.as_slice(),
                [RelayAction::SendToConnection { event: ServerEvent::RoomError { .. }, .. }]
            ),
            "delete by non-owner must reply with a single RoomError"
        );
    }

    /// Minted room codes are always syntactically valid.
    #[test]
    fn prop_created_rooms_have_valid_codes(seed in any::<u64>()) {
        let mut driver = RelayDriver::new(SeededEnv::with_seed(seed), MemoryStore::new());
        driver.process_event(RelayEvent::ConnectionOpened { conn_id: 1 });

        let actions = driver.process_event(RelayEvent::ClientEvent {
            conn_id: 1,
            event: ClientEvent::CreateRoom { display_name: "alice".to_string() },
        });

        let room = minted_room(&actions);
        prop_assert!(room.is_some());
        let Some(room) = room else { unreachable!() };
        prop_assert!(RoomCode::parse(&room).is_ok());
    }
}
