//! Session pool behaviour: reuse, forced close and contention.

mod common;

use common::{init_tracing, mock_pool, quick_config, MockToken};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use token_signature::{
    EngineError, Mechanism, PoolStats, ReturnCode, SessionPool, SessionPoolConfig, SignatureEngine,
    SignatureOperation,
};

#[test]
fn test_idle_session_is_reused() {
    init_tracing();
    let pool = mock_pool(MockToken::new());

    let first = pool.acquire().unwrap();
    let id = first.id();
    assert_eq!(
        pool.stats(),
        PoolStats {
            open: 1,
            idle: 0,
            in_use: 1
        }
    );
    first.close();
    assert_eq!(pool.stats().idle, 1);

    let second = pool.acquire().unwrap();
    assert_eq!(second.id(), id);
    assert_eq!(pool.token().count("C_OpenSession"), 1);
}

#[test]
fn test_lease_with_active_operation_is_closed() {
    let pool = mock_pool(MockToken::new());
    let pair = pool.token().add_rsa_key(1024);

    let mut lease = pool.acquire().unwrap();
    lease
        .sign_init(Mechanism::RSA_PKCS, pair.private.handle())
        .unwrap();
    assert!(lease.operation_active());
    drop(lease);

    assert_eq!(pool.token().count("C_CloseSession"), 1);
    assert_eq!(pool.stats(), PoolStats::default());
}

#[test]
fn test_finished_operation_allows_reuse() {
    let pool = mock_pool(MockToken::new());
    let pair = pool.token().add_rsa_key(1024);

    let mut lease = pool.acquire().unwrap();
    lease
        .sign_init(Mechanism::RSA_PKCS, pair.private.handle())
        .unwrap();
    lease.sign(&[0u8; 35]).unwrap();
    assert!(!lease.operation_active());
    lease.close();

    assert_eq!(pool.token().count("C_CloseSession"), 0);
    assert_eq!(pool.stats().idle, 1);
}

#[test]
fn test_kill_closes_idle_lease() {
    let pool = mock_pool(MockToken::new());
    let lease = pool.acquire().unwrap();
    lease.kill();
    assert_eq!(pool.stats().open, 0);
    assert_eq!(pool.token().open_sessions(), 0);
}

#[test]
fn test_open_failure_frees_the_slot() {
    let config = quick_config().with_max_sessions(1);
    let pool = SessionPool::new(MockToken::new(), config).unwrap();
    pool.token()
        .fail_next("C_OpenSession", ReturnCode::DeviceError);

    assert!(matches!(
        pool.acquire(),
        Err(EngineError::ProviderFailure {
            operation: "C_OpenSession",
            ..
        })
    ));
    // slot was given back
    assert!(pool.acquire().is_ok());
}

#[test]
fn test_waiter_wakes_on_release() {
    let config = SessionPoolConfig::default()
        .with_max_sessions(1)
        .with_acquire_timeout_ms(2_000);
    let pool = SessionPool::new(MockToken::new(), config).unwrap();
    let held = pool.acquire().unwrap();

    thread::scope(|scope| {
        let waiter = scope.spawn(|| pool.acquire().map(|lease| lease.id()));
        thread::sleep(Duration::from_millis(50));
        let id = held.id();
        held.close();
        assert_eq!(waiter.join().unwrap().unwrap(), id);
    });
    assert_eq!(pool.token().count("C_OpenSession"), 1);
}

#[test]
fn test_invalid_config_rejected() {
    let config = SessionPoolConfig::default().with_max_sessions(0);
    assert!(SessionPool::new(MockToken::new(), config).is_err());
}

#[test]
fn test_with_defaults_uses_default_config() {
    let pool = SessionPool::with_defaults(MockToken::new());
    assert_eq!(pool.config(), &SessionPoolConfig::default());
    assert!(pool.config().validate().is_ok());
    assert!(pool.explicit_cancel());
    assert_eq!(pool.stats(), PoolStats::default());

    let lease = pool.acquire().unwrap();
    lease.close();
    assert_eq!(pool.stats().idle, 1);
}

#[test]
fn test_engines_share_bounded_pool() {
    init_tracing();
    let config = SessionPoolConfig::default()
        .with_max_sessions(2)
        .with_acquire_timeout_ms(10_000);
    let pool = SessionPool::new(MockToken::new(), config).unwrap();
    let pair = pool.token().add_ec_key(256);

    thread::scope(|scope| {
        for worker in 0..6u8 {
            let pool = Arc::clone(&pool);
            let pair = pair.clone();
            scope.spawn(move || {
                let mut signer =
                    SignatureEngine::new(Arc::clone(&pool), "SHA256withECDSA", Mechanism::ECDSA)
                        .unwrap();
                let mut verifier =
                    SignatureEngine::new(pool, "SHA256withECDSA", Mechanism::ECDSA).unwrap();
                for round in 0..10u8 {
                    let message = [worker, round];
                    // one engine holds a session at a time
                    signer.init_sign(&pair.private).unwrap();
                    signer.update(&message).unwrap();
                    let signature = signer.sign().unwrap();
                    verifier.init_verify(&pair.public).unwrap();
                    verifier.update(&message).unwrap();
                    assert!(verifier.verify(&signature).unwrap());
                }
            });
        }
    });

    let stats = pool.stats();
    assert!(stats.open <= 2, "{stats:?}");
    assert_eq!(stats.in_use, 0);
}
