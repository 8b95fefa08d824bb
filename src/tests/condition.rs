use crate::condition::{Condition, ConditionState};
use embassy_futures::block_on;
use embassy_futures::join::join;
use embassy_futures::yield_now;

#[test]
fn test_wait_returns_matching_bits() {
    let state = ConditionState::new();
    state.set(Condition::READ_READY | Condition::CONNECTED);

    assert_eq!(Condition::READ_READY, block_on(state.wait(Condition::READ_READY)));
    assert_eq!(Condition::CONNECTED, block_on(state.wait(Condition::CONNECTED)));
}

#[test]
fn test_wait_returns_on_closed() {
    let state = ConditionState::new();
    state.set(Condition::CLOSED);

    assert_eq!(Condition::CLOSED, block_on(state.wait(Condition::READ_READY)));
}

#[test]
fn test_wait_returns_closed_with_requested_bits() {
    let state = ConditionState::new();
    state.set(Condition::READ_READY);
    state.set(Condition::CLOSED);

    let bits = block_on(state.wait(Condition::READ_READY));
    assert_eq!(Condition::READ_READY | Condition::CLOSED, bits);
}

#[test]
fn test_wait_with_custom_error_mask() {
    let state = ConditionState::new();
    state.set(Condition::CLOSED | Condition::READ_READY);

    assert_eq!(
        Condition::READ_READY,
        block_on(state.wait_with(Condition::READ_READY, Condition::empty()))
    );
}

#[test]
fn test_wait_suspends_until_set() {
    let state = ConditionState::new();

    let (bits, _) = block_on(join(state.wait(Condition::CONNECTED), async {
        yield_now().await;
        yield_now().await;
        state.set(Condition::CONNECTED);
    }));

    assert_eq!(Condition::CONNECTED, bits);
}

#[test]
fn test_clear_after_wait() {
    let state = ConditionState::new();
    state.set(Condition::READ_READY);
    block_on(state.wait(Condition::READ_READY));

    state.clear(Condition::READ_READY);
    assert!(state.bits().is_empty());
}

#[test]
fn test_clear_keeps_bit_set_after_wait() {
    let state = ConditionState::new();
    state.set(Condition::READ_READY);
    block_on(state.wait(Condition::READ_READY));

    // Notification arrives between the consuming wait and the clear
    state.set(Condition::READ_READY);
    state.clear(Condition::READ_READY);

    assert_eq!(Condition::READ_READY, state.bits());
    assert_eq!(Condition::READ_READY, block_on(state.wait(Condition::READ_READY)));
}

#[test]
fn test_clear_without_wait_is_noop() {
    let state = ConditionState::new();
    state.set(Condition::READ_READY);

    state.clear(Condition::READ_READY);
    assert_eq!(Condition::READ_READY, state.bits());
}

#[test]
fn test_reset() {
    let state = ConditionState::new();
    state.set(Condition::CLOSED | Condition::CONNECTED);

    state.reset();
    assert!(state.bits().is_empty());

    state.set(Condition::READ_READY);
    block_on(state.wait(Condition::READ_READY));
    state.clear(Condition::READ_READY);
    assert!(state.bits().is_empty());
}
