use fetchkeep::config::MAX_CLIENTS;
use fetchkeep::engine::Engine;
use tokio::net::{TcpListener, TcpStream};

#[test]
fn connection_limit_constant() {
    assert_eq!(MAX_CLIENTS, 1200);
}

#[tokio::test]
async fn gate_hard_rejects_past_capacity() {
    let engine = Engine::new();
    let mut acquired = 0;
    // Drain the gate directly rather than opening 1200 real sockets.
    for _ in 0..MAX_CLIENTS {
        assert!(engine.gate.try_acquire());
        acquired += 1;
    }
    assert_eq!(acquired, MAX_CLIENTS);
    assert!(!engine.gate.try_acquire());

    engine.gate.release();
    assert!(engine.gate.try_acquire());
}

/// §8 scenario 6: 1500 concurrent clients, `MAX_CLIENTS = 1200`; at
/// least 300 receive 503, the rest are admitted, and total admissions
/// plus rejections equals the number of attempts.
#[tokio::test]
async fn overflow_scenario_matches_spec_arithmetic() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accept_task = tokio::spawn(async move {
        loop {
            if listener.accept().await.is_err() {
                break;
            }
        }
    });

    let engine = Engine::new();
    let mut admitted = 0usize;
    let mut rejected = 0usize;

    for _ in 0..1500 {
        let client = TcpStream::connect(addr).await.unwrap();
        if fetchkeep::engine::admit_or_reject(&engine, client, addr).await {
            admitted += 1;
        } else {
            rejected += 1;
        }
    }

    assert_eq!(admitted + rejected, 1500);
    assert!(rejected >= 300);
    assert!(admitted <= MAX_CLIENTS);

    engine.begin_shutdown().await;
    accept_task.abort();
}
