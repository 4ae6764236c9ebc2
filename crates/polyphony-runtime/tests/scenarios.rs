//! End-to-end coordination scenarios: async operations feeding the event
//! stream, interruption, fault delivery, and dynamic admission.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::time::{sleep, Duration};

use polyphony_runtime::prelude::*;

#[test]
fn test_async_op_value_enters_the_event_stream() {
    tokio_test::block_on(async {
        let records = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&records);

        run_system(move |admitter: Admitter<&str>| async move {
            admitter
                .admit("worker", |mut hx| async move {
                    hx.sync(SyncSpec::new().with_exec(|| async {
                        sleep(Duration::from_millis(2)).await;
                        Ok("done")
                    }))
                    .await?;
                    Ok(())
                })
                .await;
            admitter
                .admit("observer", move |mut hx| async move {
                    let event = hx.sync(SyncSpec::new().with_wait(|_| true)).await?;
                    seen.lock().unwrap().push(event);
                    Ok(())
                })
                .await;
        })
        .await
        .expect("run");

        assert_eq!(records.lock().unwrap().clone(), vec!["done"]);
    });
}

#[test]
fn test_advancing_event_cancels_the_op() {
    tokio_test::block_on(async {
        let op_finished = Arc::new(AtomicBool::new(false));
        let finished = Arc::clone(&op_finished);
        let records = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&records);

        run_system(move |admitter: Admitter<&str>| async move {
            admitter
                .admit("worker", move |mut hx| async move {
                    let event = hx
                        .sync(
                            SyncSpec::new()
                                .with_wait(|e| *e == "timeout")
                                .with_exec(move || async move {
                                    sleep(Duration::from_secs(10)).await;
                                    finished.store(true, Ordering::SeqCst);
                                    Ok("done")
                                }),
                        )
                        .await?;
                    seen.lock().unwrap().push(event);
                    Ok(())
                })
                .await;
            admitter
                .admit("alarm", |mut hx| async move {
                    hx.sync(SyncSpec::new().with_post("timeout")).await?;
                    Ok(())
                })
                .await;
        })
        .await
        .expect("run");

        let records = records.lock().unwrap().clone();
        assert_eq!(records, vec!["timeout"]);
        assert!(!op_finished.load(Ordering::SeqCst));
    });
}

#[test]
fn test_op_fault_can_be_caught_by_the_body() {
    tokio_test::block_on(async {
        let records = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&records);
        let faults = Arc::new(Mutex::new(Vec::new()));
        let caught = Arc::clone(&faults);

        run_system(move |admitter: Admitter<&str>| async move {
            admitter
                .admit("fallible", move |mut hx| async move {
                    let outcome = hx
                        .sync(SyncSpec::new().with_exec(|| async { Err(Fault::new("lookup failed")) }))
                        .await;
                    match outcome {
                        Ok(_) => Ok(()),
                        Err(fault) => {
                            caught.lock().unwrap().push(fault.message().to_string());
                            hx.sync(SyncSpec::new().with_post("recovered")).await?;
                            Ok(())
                        }
                    }
                })
                .await;
            admitter
                .admit("observer", move |mut hx| async move {
                    let event = hx.sync(SyncSpec::new().with_wait(|_| true)).await?;
                    seen.lock().unwrap().push(event);
                    Ok(())
                })
                .await;
        })
        .await
        .expect("run");

        assert_eq!(faults.lock().unwrap().clone(), vec!["lookup failed"]);
        assert_eq!(records.lock().unwrap().clone(), vec!["recovered"]);
    });
}

#[test]
fn test_uncaught_fault_terminates_only_the_offending_thread() {
    tokio_test::block_on(async {
        let records = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&records);

        run_system(move |admitter: Admitter<&str>| async move {
            admitter
                .admit("doomed", |mut hx| async move {
                    // Propagates the op fault and dies.
                    hx.sync(SyncSpec::new().with_exec(|| async { Err(Fault::new("boom")) }))
                        .await?;
                    Ok(())
                })
                .await;
            admitter
                .admit("survivor", |mut hx| async move {
                    hx.sync(SyncSpec::new().with_post("still-here")).await?;
                    Ok(())
                })
                .await;
            admitter
                .admit("observer", move |mut hx| async move {
                    let event = hx.sync(SyncSpec::new().with_wait(|_| true)).await?;
                    seen.lock().unwrap().push(event);
                    Ok(())
                })
                .await;
        })
        .await
        .expect("run");

        assert_eq!(records.lock().unwrap().clone(), vec!["still-here"]);
    });
}

#[test]
fn test_behavior_can_admit_peers_when_advanced() {
    tokio_test::block_on(async {
        let records = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&records);

        run_system(move |admitter: Admitter<&str>| async move {
            let recruiter = admitter.clone();
            admitter
                .admit("spawner", move |mut hx| async move {
                    hx.sync(SyncSpec::new().with_post("go")).await?;
                    recruiter
                        .admit("late", |mut hx| async move {
                            hx.sync(SyncSpec::new().with_post("late-event")).await?;
                            Ok(())
                        })
                        .await;
                    Ok(())
                })
                .await;
            admitter
                .admit("observer", move |mut hx| async move {
                    loop {
                        let event = hx.sync(SyncSpec::new().with_wait(|_| true)).await?;
                        seen.lock().unwrap().push(event);
                    }
                })
                .await;
        })
        .await
        .expect("run");

        assert_eq!(records.lock().unwrap().clone(), vec!["go", "late-event"]);
    });
}

#[test]
fn test_admission_while_idle_rouses_the_scheduler() {
    tokio_test::block_on(async {
        let records = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&records);

        run_system(move |admitter: Admitter<&str>| async move {
            admitter
                .admit("observer", move |mut hx| async move {
                    let event = hx.sync(SyncSpec::new().with_wait(|_| true)).await?;
                    seen.lock().unwrap().push(event);
                    Ok(())
                })
                .await;
            // Let the scheduler go idle before anything is postable.
            sleep(Duration::from_millis(5)).await;
            admitter
                .admit("latecomer", |mut hx| async move {
                    hx.sync(SyncSpec::new().with_post("knock")).await?;
                    Ok(())
                })
                .await;
        })
        .await
        .expect("run");

        assert_eq!(records.lock().unwrap().clone(), vec!["knock"]);
    });
}

#[test]
fn test_program_panic_is_fatal() {
    tokio_test::block_on(async {
        let result = run_system(|_admitter: Admitter<&str>| async move {
            panic!("program exploded");
        })
        .await;

        match result {
            Err(RuntimeError::Program(message)) => {
                assert!(message.contains("program exploded"));
            }
            other => panic!("expected program failure, got {:?}", other),
        }
    });
}
