//! Integration tests for relayed meta-transactions
//!
//! Multi-signature thresholds, gas limits, replay protection, refunds in
//! native currency and tokens, and full rollback when any step fails.

use crate::support::{ACCOUNT, Fixture, INITIAL_BALANCE, RELAYER, TARGET, TOKEN, sign_all};
use alloy_primitives::{Address, Bytes, U256};
use identity_core::relay::{NonceMode, OperationType};
use identity_core::{
    AccountConfig, AccountEvent, Error, KeyId, KeyType, Purpose, SelfCall, ThresholdMode,
};

const GAS_LIMIT: u64 = 4_000_000;

// ============================================================================
// Thresholds
// ============================================================================

#[test]
fn test_two_signers_required() {
    let mut fixture = Fixture::new();
    let first = fixture.add_signer(Purpose::ACTION);
    let second = fixture.add_signer(Purpose::ACTION);
    assert_eq!(fixture.account.required_signatures(), 2);

    let msg = fixture
        .message_to(TARGET)
        .with_value(U256::from(1_000))
        .with_gas(U256::ZERO, 100_000);

    assert_eq!(
        fixture.submit(&msg, &sign_all(&msg, &[&first]), 200_000),
        Err(Error::InsufficientSignatures {
            required: 2,
            actual: 1
        })
    );
    assert_eq!(fixture.account.last_nonce(), 0);

    fixture
        .submit(&msg, &sign_all(&msg, &[&second, &first]), 200_000)
        .unwrap();

    assert_eq!(fixture.account.last_nonce(), 1);
    let calls = fixture.chain.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].to, TARGET);
    assert_eq!(calls[0].value, U256::from(1_000));
}

#[test]
fn test_zero_signatures_are_insufficient() {
    let mut fixture = Fixture::new();
    fixture.add_signer(Purpose::ACTION);
    let msg = fixture.message_to(TARGET).with_gas(U256::ZERO, 50_000);

    assert_eq!(
        fixture.submit(&msg, &[], 100_000),
        Err(Error::InsufficientSignatures {
            required: 1,
            actual: 0
        })
    );
}

#[test]
fn test_fixed_threshold_from_config() {
    let mut fixture =
        Fixture::with_config(AccountConfig::default().with_threshold(ThresholdMode::Fixed(1)));
    let first = fixture.add_signer(Purpose::ACTION);
    fixture.add_signer(Purpose::ACTION);
    fixture.add_signer(Purpose::ACTION);

    let msg = fixture.message_to(TARGET).with_gas(U256::ZERO, 50_000);
    fixture
        .submit(&msg, &sign_all(&msg, &[&first]), 100_000)
        .unwrap();
    assert_eq!(fixture.account.last_nonce(), 1);
}

#[test]
fn test_management_key_cannot_sign_outgoing_call() {
    let mut fixture = Fixture::new();
    fixture.add_signer(Purpose::ACTION);
    let msg = fixture.message_to(TARGET).with_gas(U256::ZERO, 50_000);
    let owner_sig = msg.sign(&fixture.owner).unwrap();

    assert!(matches!(
        fixture.submit(&msg, &[owner_sig], 100_000),
        Err(Error::InvalidSignature(_))
    ));
}

#[test]
fn test_signature_over_other_message_is_rejected() {
    let mut fixture = Fixture::new();
    let signer = fixture.add_signer(Purpose::ACTION);
    let msg = fixture.message_to(TARGET).with_gas(U256::ZERO, 50_000);
    let tampered = msg.clone().with_value(U256::from(5));

    let sig = msg.sign(&signer).unwrap();
    assert!(matches!(
        fixture.submit(&tampered, &[sig], 100_000),
        Err(Error::InvalidSignature(_))
    ));
}

// ============================================================================
// Gas
// ============================================================================

#[test]
fn test_gas_limit_check() {
    let mut fixture = Fixture::new();
    let signer = fixture.add_signer(Purpose::ACTION);
    let msg = fixture
        .message_to(TARGET)
        .with_gas(U256::from(1), GAS_LIMIT);
    let sigs = sign_all(&msg, &[&signer]);

    assert!(matches!(
        fixture.submit(&msg, &sigs, GAS_LIMIT * 9 / 10),
        Err(Error::InsufficientGas { .. })
    ));
    assert_eq!(fixture.account.last_nonce(), 0);

    fixture.submit(&msg, &sigs, GAS_LIMIT * 11 / 10).unwrap();
    assert_eq!(fixture.account.last_nonce(), 1);
}

#[test]
fn test_zero_gas_limit_needs_base_overhead() {
    let mut fixture = Fixture::new();
    let signer = fixture.add_signer(Purpose::ACTION);
    let base = fixture.account.config().gas.base_overhead;
    let msg = fixture.message_to(TARGET).with_gas(U256::ZERO, 0);
    let sigs = sign_all(&msg, &[&signer]);

    for supplied in [0, base - 1] {
        assert_eq!(
            fixture.submit(&msg, &sigs, supplied),
            Err(Error::InsufficientGas {
                required: base,
                available: supplied,
            })
        );
    }
    assert_eq!(fixture.account.last_nonce(), 0);
    assert!(fixture.chain.calls().is_empty());
}

#[test]
fn test_gas_estimate_matches_metered_gas() {
    let mut fixture = Fixture::new();
    let first = fixture.add_signer(Purpose::ACTION);
    let second = fixture.add_signer(Purpose::ACTION);

    let msg = fixture
        .message_to(TARGET)
        .with_value(U256::from(7))
        .with_data(Bytes::from(vec![0x11; 36]))
        .with_gas(U256::from(2), 100_000);
    let sigs = sign_all(&msg, &[&first, &second]);

    let (executable, estimate) =
        fixture
            .account
            .gas_estimate(&msg, &sigs, 200_000, &fixture.chain.host(ACCOUNT));
    assert!(executable);

    let receipt = fixture.submit(&msg, &sigs, 200_000).unwrap();
    assert_eq!(receipt.gas_used, estimate);
    assert_eq!(receipt.refund, U256::from(estimate * 2));

    // Consumed nonce: same cost, no longer executable
    let (executable, again) =
        fixture
            .account
            .gas_estimate(&msg, &sigs, 200_000, &fixture.chain.host(ACCOUNT));
    assert!(!executable);
    assert_eq!(again, estimate);

    // Self calls are charged the fixed self-call cost
    let data = SelfCall::SetRequiredSignatures { required: 1 }.encode();
    let self_msg = fixture
        .message_to(ACCOUNT)
        .with_data(Bytes::from(data))
        .with_gas(U256::ZERO, 100_000);
    let owner = fixture.owner.clone();
    let owner_sigs = sign_all(&self_msg, &[&owner]);
    let (executable, estimate) = fixture.account.gas_estimate(
        &self_msg,
        &owner_sigs,
        200_000,
        &fixture.chain.host(ACCOUNT),
    );
    assert!(executable);
    let receipt = fixture.submit(&self_msg, &owner_sigs, 200_000).unwrap();
    assert_eq!(receipt.gas_used, estimate);
}

#[test]
fn test_dispatch_out_of_gas_rolls_back() {
    let mut fixture = Fixture::new();
    let signer = fixture.add_signer(Purpose::ACTION);
    // Stipend below the in-memory call cost
    let msg = fixture.message_to(TARGET).with_gas(U256::from(1), 1_000);
    let sigs = sign_all(&msg, &[&signer]);

    assert!(matches!(
        fixture.submit(&msg, &sigs, 100_000),
        Err(Error::CallFailed(_))
    ));
    assert_eq!(fixture.account.last_nonce(), 0);
    assert_eq!(fixture.chain.native_balance(RELAYER), U256::ZERO);
}

// ============================================================================
// Replay
// ============================================================================

#[test]
fn test_replay_fails() {
    let mut fixture = Fixture::new();
    let signer = fixture.add_signer(Purpose::ACTION);
    let msg = fixture.message_to(TARGET).with_gas(U256::from(1), 100_000);
    let sigs = sign_all(&msg, &[&signer]);

    fixture.submit(&msg, &sigs, 200_000).unwrap();
    let balance_after_first = fixture.chain.native_balance(ACCOUNT);

    assert!(matches!(
        fixture.submit(&msg, &sigs, 200_000),
        Err(Error::InvalidNonce(_))
    ));
    assert_eq!(fixture.chain.native_balance(ACCOUNT), balance_after_first);
    assert_eq!(fixture.chain.calls().len(), 1);
}

#[test]
fn test_skipped_nonce_fails() {
    let mut fixture = Fixture::new();
    let signer = fixture.add_signer(Purpose::ACTION);
    let msg = fixture
        .message_to(TARGET)
        .with_nonce(3)
        .with_gas(U256::ZERO, 100_000);

    assert!(matches!(
        fixture.submit(&msg, &sign_all(&msg, &[&signer]), 200_000),
        Err(Error::InvalidNonce(_))
    ));
}

#[test]
fn test_timestamp_nonces() {
    let mut fixture = Fixture::new();
    let signer = fixture.add_signer(Purpose::ACTION);
    let now = 1_700_000_000;
    fixture.chain.set_timestamp(now);

    let msg = fixture
        .message_to(TARGET)
        .with_nonce(now - 5)
        .with_gas(U256::ZERO, 100_000);
    let receipt = fixture
        .submit(&msg, &sign_all(&msg, &[&signer]), 200_000)
        .unwrap();
    assert_eq!(receipt.nonce_mode, NonceMode::Timestamp);
    assert_eq!(fixture.account.last_timestamp(), now - 5);
    assert_eq!(fixture.account.last_nonce(), 0);

    // Same or older timestamp is a replay
    let older = msg.clone().with_nonce(now - 6);
    assert!(matches!(
        fixture.submit(&older, &sign_all(&older, &[&signer]), 200_000),
        Err(Error::InvalidNonce(_))
    ));

    // Future timestamps are not accepted until the clock catches up
    let future = msg.clone().with_nonce(now + 60);
    let future_sigs = sign_all(&future, &[&signer]);
    assert!(matches!(
        fixture.submit(&future, &future_sigs, 200_000),
        Err(Error::InvalidNonce(_))
    ));
    fixture.chain.advance_time(60);
    fixture.submit(&future, &future_sigs, 200_000).unwrap();
    assert_eq!(fixture.account.last_timestamp(), now + 60);
}

// ============================================================================
// Funds and refunds
// ============================================================================

#[test]
fn test_value_above_balance_fails_without_state_change() {
    let mut fixture = Fixture::new();
    let signer = fixture.add_signer(Purpose::ACTION);
    let events_before = fixture.account.events().to_vec();

    let msg = fixture
        .message_to(TARGET)
        .with_value(U256::from(INITIAL_BALANCE) * U256::from(2))
        .with_gas(U256::from(1), 100_000);
    let result = fixture.submit(&msg, &sign_all(&msg, &[&signer]), 200_000);

    assert!(matches!(result, Err(Error::InsufficientFunds { .. })));
    assert_eq!(fixture.account.last_nonce(), 0);
    assert_eq!(fixture.account.events(), events_before.as_slice());
    assert_eq!(fixture.chain.native_balance(ACCOUNT), U256::from(INITIAL_BALANCE));
    assert_eq!(fixture.chain.native_balance(RELAYER), U256::ZERO);

    // Same nonce with a value the account can afford
    let affordable = msg.with_value(U256::from(INITIAL_BALANCE / 2));
    fixture
        .submit(&affordable, &sign_all(&affordable, &[&signer]), 200_000)
        .unwrap();
    assert_eq!(fixture.account.last_nonce(), 1);
}

#[test]
fn test_native_refund_paid_to_relayer() {
    let mut fixture = Fixture::new();
    let signer = fixture.add_signer(Purpose::ACTION);
    let gas_price = U256::from(2_000_000_000u64);
    let msg = fixture.message_to(TARGET).with_gas(gas_price, 100_000);

    let receipt = fixture
        .submit(&msg, &sign_all(&msg, &[&signer]), 200_000)
        .unwrap();

    let schedule = fixture.account.config().gas;
    let expected_gas = schedule.base_overhead
        + schedule.per_signature
        + fixture.chain.call_cost(0)
        + schedule.refund_overhead;
    assert_eq!(receipt.gas_used, expected_gas);
    assert_eq!(receipt.refund, U256::from(expected_gas) * gas_price);
    assert_eq!(fixture.chain.native_balance(RELAYER), receipt.refund);
    assert_eq!(
        fixture.chain.native_balance(ACCOUNT),
        U256::from(INITIAL_BALANCE) - receipt.refund
    );

    assert_eq!(
        fixture.account.events().last(),
        Some(&AccountEvent::ExecutedSigned {
            digest: msg.digest(),
            nonce: 1,
            relayer: RELAYER,
            gas_used: expected_gas,
            refund: receipt.refund,
            gas_token: Address::ZERO,
        })
    );
}

#[test]
fn test_zero_gas_price_pays_nothing() {
    let mut fixture = Fixture::new();
    let signer = fixture.add_signer(Purpose::ACTION);
    let msg = fixture.message_to(TARGET).with_gas(U256::ZERO, 100_000);

    let receipt = fixture
        .submit(&msg, &sign_all(&msg, &[&signer]), 200_000)
        .unwrap();

    assert!(receipt.refund.is_zero());
    assert_eq!(fixture.chain.native_balance(RELAYER), U256::ZERO);
}

#[test]
fn test_unaffordable_refund_reverts_dispatch() {
    let mut fixture = Fixture::new();
    let signer = fixture.add_signer(Purpose::ACTION);
    // Value is affordable, value plus refund is not
    let value = U256::from(INITIAL_BALANCE - 1_000);
    let msg = fixture
        .message_to(TARGET)
        .with_value(value)
        .with_gas(U256::from(1), 100_000);

    let result = fixture.submit(&msg, &sign_all(&msg, &[&signer]), 200_000);

    assert!(matches!(result, Err(Error::InsufficientFunds { .. })));
    assert_eq!(fixture.account.last_nonce(), 0);
    assert!(fixture.chain.calls().is_empty());
    assert_eq!(fixture.chain.native_balance(TARGET), U256::ZERO);
    assert_eq!(fixture.chain.native_balance(ACCOUNT), U256::from(INITIAL_BALANCE));
}

#[test]
fn test_token_refund() {
    let mut fixture = Fixture::new();
    let signer = fixture.add_signer(Purpose::ACTION);
    fixture.chain.mint(TOKEN, ACCOUNT, U256::from(10_000_000));

    let msg = fixture
        .message_to(TARGET)
        .with_gas(U256::from(3), 100_000)
        .with_gas_token(TOKEN);
    let receipt = fixture
        .submit(&msg, &sign_all(&msg, &[&signer]), 200_000)
        .unwrap();

    assert_eq!(receipt.gas_token, TOKEN);
    assert_eq!(fixture.chain.token_balance(TOKEN, RELAYER), receipt.refund);
    assert_eq!(
        fixture.chain.token_balance(TOKEN, ACCOUNT),
        U256::from(10_000_000) - receipt.refund
    );
    // Native balance untouched by the refund
    assert_eq!(fixture.chain.native_balance(ACCOUNT), U256::from(INITIAL_BALANCE));
}

#[test]
fn test_token_refund_shortfall() {
    let mut fixture = Fixture::new();
    let signer = fixture.add_signer(Purpose::ACTION);
    fixture.chain.mint(TOKEN, ACCOUNT, U256::from(10));

    let msg = fixture
        .message_to(TARGET)
        .with_gas(U256::from(1), 100_000)
        .with_gas_token(TOKEN);

    assert!(matches!(
        fixture.submit(&msg, &sign_all(&msg, &[&signer]), 200_000),
        Err(Error::InsufficientFunds { .. })
    ));
    assert!(fixture.chain.calls().is_empty());
    assert_eq!(fixture.account.last_nonce(), 0);
}

#[test]
fn test_refused_token_transfer_rolls_back() {
    let mut fixture = Fixture::new();
    let signer = fixture.add_signer(Purpose::ACTION);
    fixture.chain.mint(TOKEN, ACCOUNT, U256::from(10_000_000));
    fixture.chain.refuse_transfers(TOKEN);

    let msg = fixture
        .message_to(TARGET)
        .with_value(U256::from(7))
        .with_gas(U256::from(1), 100_000)
        .with_gas_token(TOKEN);

    assert!(matches!(
        fixture.submit(&msg, &sign_all(&msg, &[&signer]), 200_000),
        Err(Error::CallFailed(_))
    ));
    assert!(fixture.chain.calls().is_empty());
    assert_eq!(fixture.chain.native_balance(TARGET), U256::ZERO);
    assert_eq!(fixture.account.last_nonce(), 0);
}

#[test]
fn test_reverting_target_rolls_back() {
    let mut fixture = Fixture::new();
    let signer = fixture.add_signer(Purpose::ACTION);
    fixture.chain.revert_calls_to(TARGET);

    let msg = fixture.message_to(TARGET).with_gas(U256::from(1), 100_000);
    assert!(matches!(
        fixture.submit(&msg, &sign_all(&msg, &[&signer]), 200_000),
        Err(Error::CallFailed(_))
    ));
    assert_eq!(fixture.account.last_nonce(), 0);
    assert_eq!(fixture.chain.native_balance(RELAYER), U256::ZERO);
}

// ============================================================================
// Message validation
// ============================================================================

#[test]
fn test_foreign_sender_rejected() {
    let mut fixture = Fixture::new();
    let signer = fixture.add_signer(Purpose::ACTION);
    let mut msg = fixture.message_to(TARGET).with_gas(U256::ZERO, 100_000);
    msg.from = Address::repeat_byte(0xbb);

    assert!(matches!(
        fixture.submit(&msg, &sign_all(&msg, &[&signer]), 200_000),
        Err(Error::InvalidSender(_))
    ));
}

#[test]
fn test_unsupported_operations() {
    let mut fixture = Fixture::new();
    let signer = fixture.add_signer(Purpose::ACTION);

    for op in [OperationType::DELEGATECALL, OperationType::CREATE, OperationType(3)] {
        let msg = fixture
            .message_to(TARGET)
            .with_gas(U256::ZERO, 100_000)
            .with_operation_type(op);
        assert_eq!(
            fixture.submit(&msg, &sign_all(&msg, &[&signer]), 200_000),
            Err(Error::UnsupportedOperation(op.code()))
        );
    }
}

#[test]
fn test_can_execute_does_not_mutate() {
    let mut fixture = Fixture::new();
    let signer = fixture.add_signer(Purpose::ACTION);
    let msg = fixture.message_to(TARGET).with_gas(U256::ZERO, 100_000);
    let sigs = sign_all(&msg, &[&signer]);

    let plan = fixture
        .account
        .can_execute(&msg, &sigs, 200_000, fixture.chain.timestamp())
        .unwrap();
    assert_eq!(plan.digest, msg.digest());
    assert_eq!(plan.required_signatures, 1);
    assert_eq!(fixture.account.last_nonce(), 0);

    // The same message is still executable
    fixture.submit(&msg, &sigs, 200_000).unwrap();
}

// ============================================================================
// Self calls through the relay
// ============================================================================

#[test]
fn test_signed_self_call_requires_management_signers() {
    let mut fixture = Fixture::new();
    let actor = fixture.add_signer(Purpose::ACTION);
    let new_key = KeyId::from_address(Address::repeat_byte(0x44));
    let data = SelfCall::AddKey {
        key: new_key,
        purpose: Purpose::CLAIM,
        key_type: KeyType::ECDSA,
    }
    .encode();
    let msg = fixture
        .message_to(ACCOUNT)
        .with_data(Bytes::from(data))
        .with_gas(U256::from(1), 100_000);

    assert!(matches!(
        fixture.submit(&msg, &sign_all(&msg, &[&actor]), 200_000),
        Err(Error::InvalidSignature(_))
    ));

    let owner = fixture.owner.clone();
    let receipt = fixture
        .submit(&msg, &sign_all(&msg, &[&owner]), 200_000)
        .unwrap();

    assert!(fixture.account.key_has_purpose(&new_key, Purpose::CLAIM));
    let schedule = fixture.account.config().gas;
    assert_eq!(
        receipt.gas_used,
        schedule.base_overhead + schedule.per_signature + schedule.self_call + schedule.refund_overhead
    );
    assert!(fixture.chain.calls().is_empty());
}

#[test]
fn test_signed_threshold_change() {
    let mut fixture = Fixture::new();
    let first = fixture.add_signer(Purpose::ACTION);
    fixture.add_signer(Purpose::ACTION);
    fixture.add_signer(Purpose::ACTION);
    assert_eq!(fixture.account.required_signatures(), 3);

    let data = SelfCall::SetRequiredSignatures { required: 1 }.encode();
    let msg = fixture
        .message_to(ACCOUNT)
        .with_data(Bytes::from(data))
        .with_gas(U256::ZERO, 100_000);
    let owner = fixture.owner.clone();
    fixture
        .submit(&msg, &sign_all(&msg, &[&owner]), 200_000)
        .unwrap();

    assert_eq!(fixture.account.required_signatures(), 1);
    assert_eq!(fixture.account.threshold_mode(), ThresholdMode::Fixed(1));

    let next = fixture.message_to(TARGET).with_gas(U256::ZERO, 100_000);
    fixture
        .submit(&next, &sign_all(&next, &[&first]), 200_000)
        .unwrap();
    assert_eq!(fixture.account.last_nonce(), 2);
}

#[test]
fn test_signed_threshold_out_of_range_rolls_back() {
    let mut fixture = Fixture::new();
    fixture.add_signer(Purpose::ACTION);

    let data = SelfCall::SetRequiredSignatures { required: 5 }.encode();
    let msg = fixture
        .message_to(ACCOUNT)
        .with_data(Bytes::from(data))
        .with_gas(U256::ZERO, 100_000);
    let owner = fixture.owner.clone();

    assert!(matches!(
        fixture.submit(&msg, &sign_all(&msg, &[&owner]), 200_000),
        Err(Error::InvalidThreshold(_))
    ));
    assert_eq!(fixture.account.last_nonce(), 0);
    assert_eq!(fixture.account.threshold_mode(), ThresholdMode::AllSigners);
}

#[test]
fn test_fixed_threshold_survives_signer_removal() {
    let mut fixture = Fixture::new();
    let owner = fixture.owner_address();
    let first = fixture.add_signer(Purpose::ACTION);
    let second = fixture.add_signer(Purpose::ACTION);
    fixture.account.set_required_signatures(owner, 2).unwrap();

    fixture
        .account
        .remove_key(owner, second.key_id(), Purpose::ACTION)
        .unwrap();
    assert_eq!(fixture.account.required_signatures(), 1);

    let msg = fixture
        .message_to(TARGET)
        .with_value(U256::from(10))
        .with_gas(U256::ZERO, 100_000);
    fixture
        .submit(&msg, &sign_all(&msg, &[&first]), 200_000)
        .unwrap();
    assert_eq!(fixture.chain.native_balance(TARGET), U256::from(10));
}

#[test]
fn test_fixed_threshold_capped_for_management_self_calls() {
    let mut fixture = Fixture::new();
    let owner = fixture.owner_address();
    fixture.add_signer(Purpose::ACTION);
    fixture.add_signer(Purpose::ACTION);
    fixture.account.set_required_signatures(owner, 2).unwrap();
    assert_eq!(fixture.account.management_key_count(), 1);

    let new_key = KeyId::from_address(Address::repeat_byte(0x45));
    let data = SelfCall::AddKey {
        key: new_key,
        purpose: Purpose::CLAIM,
        key_type: KeyType::ECDSA,
    }
    .encode();
    let msg = fixture
        .message_to(ACCOUNT)
        .with_data(Bytes::from(data))
        .with_gas(U256::ZERO, 100_000);
    let owner_signer = fixture.owner.clone();
    fixture
        .submit(&msg, &sign_all(&msg, &[&owner_signer]), 200_000)
        .unwrap();

    assert!(fixture.account.key_has_purpose(&new_key, Purpose::CLAIM));
}
