//! Two engines standing in for two players of the same match.

use serde_json::json;
use turnsync::network::messages::events;
use turnsync::{compute_checksum, StateDelta, SyncEngineConfig};
use web_time::Duration;

use crate::common::{board, engine_with_clock, moved_board};

#[test]
fn optimistic_move_syncs_and_unconfirmed_roll_rolls_back() {
    let mut client = engine_with_clock(SyncEngineConfig::default(), "p1");
    let mut peer = engine_with_clock(SyncEngineConfig::default(), "p2");

    // both sides start from the same board; the dice roll is delta 1
    let start = board();
    let mut rolled = board();
    rolled["dice"] = json!(5);
    assert!(client.engine.update_state(&start).is_none());
    assert_eq!(client.engine.update_state(&rolled).unwrap().version, 1);
    peer.engine.update_state(&rolled);

    // move token to cell 5, applied locally before anyone confirms it
    assert!(client.engine.send_action(
        "move-1",
        events::TOKEN_MOVE,
        json!({ "token": 0, "to": 5 }),
        rolled.clone(),
    ));
    let mut moved = rolled.clone();
    moved["players"][0]["tokens"][0] = json!(5);
    let delta = client.engine.update_state(&moved).unwrap();
    assert_eq!(delta.version, 2);
    assert_eq!(client.transport.events(), vec![events::TOKEN_MOVE]);

    // the delta crosses the wire as JSON
    let wire = serde_json::to_string(&delta).unwrap();
    let received: StateDelta = serde_json::from_str(&wire).unwrap();
    let peer_state = peer.engine.apply_remote_delta(&rolled, &received).unwrap();
    assert_eq!(peer_state, moved);

    let peer_checksum = compute_checksum(&peer_state);
    assert!(client.engine.verify_sync(peer_checksum));
    assert!(peer.engine.verify_sync(delta.checksum));
    assert!(client.engine.confirm_action("move-1"));

    // a second action is never confirmed
    assert!(client.engine.send_action(
        "roll-2",
        events::DICE_ROLL_START,
        json!({}),
        moved.clone(),
    ));
    client.clock.advance(Duration::from_millis(1600));
    client.engine.poll();

    let rollbacks = client.handler.log().rollbacks;
    assert_eq!(rollbacks.len(), 1);
    assert_eq!(rollbacks[0].id, "roll-2");
    assert_eq!(rollbacks[0].optimistic_state, moved);

    let stats = client.engine.stats();
    assert_eq!(stats.actions.confirmed, 1);
    assert_eq!(stats.actions.rollbacks, 1);
    assert_eq!(stats.delta_version, 2);
}

#[test]
fn diverged_peers_detect_desync() {
    let mut a = engine_with_clock(SyncEngineConfig::default(), "p1");
    let mut b = engine_with_clock(SyncEngineConfig::default(), "p2");
    a.engine.update_state(&moved_board(4));
    b.engine.update_state(&moved_board(6));

    let theirs = compute_checksum(&moved_board(6));
    assert!(!a.engine.verify_sync(theirs));
    assert!(!a.engine.verify_sync(theirs));
    assert_eq!(a.handler.log().desyncs.len(), 1);
    assert!(b.handler.log().desyncs.is_empty());
}

#[test]
fn delta_with_removed_and_added_leaves_reaches_peer() {
    let mut a = engine_with_clock(SyncEngineConfig::default(), "p1");
    let mut b = engine_with_clock(SyncEngineConfig::default(), "p2");
    let before = board();
    a.engine.update_state(&before);
    b.engine.update_state(&before);

    let mut after = board();
    after["players"][1]["tokens"] = json!([0, 0]);
    after["winner"] = json!("p1");
    after.as_object_mut().unwrap().remove("dice");
    let delta = a.engine.update_state(&after).unwrap();

    let synced = b.engine.apply_remote_delta(&before, &delta).unwrap();
    assert_eq!(synced, after);
    assert!(b.engine.verify_sync(delta.checksum));
}
