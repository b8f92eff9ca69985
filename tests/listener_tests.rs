//! Listener behavior through the public `Port` API.
//!
//! Tests follow the Arrange-Act-Assert pattern. `Port::settle` is used after
//! feeding data so every assertion sees a fully processed notification queue.

mod common;

use common::{capture_errors, open_mock_port, open_mock_port_with, Collector};
use serial_events::{
    ByteSink, ListenOptions, ListenerState, PortError, Registration, SerialError,
};
use std::sync::Arc;

// ============================================================================
// Single-byte framing
// ============================================================================

mod byte_listener {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_skip_buffered_discards_backlog() {
        // Arrange: five bytes are waiting before anyone listens
        let (port, device) = open_mock_port_with(&[1, 2, 3, 4, 5]);
        let bytes = Collector::<u8>::new();

        // Act
        port.on_byte(bytes.handler(), true).unwrap();
        port.settle();
        device.enqueue_read(&[42]);
        port.settle();

        // Assert: only the byte that arrived after binding is delivered
        assert_eq!(bytes.items(), vec![42]);
    }

    #[test]
    fn test_backlog_delivered_when_not_skipped() {
        let (port, _device) = open_mock_port_with(&[1, 2, 3]);
        let bytes = Collector::<u8>::new();

        port.on_byte(bytes.handler(), false).unwrap();
        port.settle();

        assert_eq!(bytes.items(), vec![1, 2, 3]);
    }

    #[test]
    fn test_bytes_arrive_in_order_across_firings() {
        let (port, device) = open_mock_port();
        let bytes = Collector::<u8>::new();
        port.on_byte(bytes.handler(), true).unwrap();

        device.enqueue_read(b"ab");
        device.enqueue_read(b"c");
        device.enqueue_read(b"de");
        port.settle();

        assert_eq!(bytes.items(), b"abcde".to_vec());
    }

    #[test]
    fn test_spurious_notification_delivers_nothing() {
        let (port, device) = open_mock_port();
        let bytes = Collector::<u8>::new();
        port.on_byte(bytes.handler(), true).unwrap();

        device.fire_spurious();
        port.settle();

        assert_eq!(bytes.len(), 0);
        assert_eq!(port.listener_state(), ListenerState::Armed);
    }
}

// ============================================================================
// Fixed-size framing
// ============================================================================

mod chunk_listener {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_exact_size_is_delivered_once() {
        let (port, device) = open_mock_port();
        let chunks = Collector::<Vec<u8>>::new();
        port.on_n_bytes(4, chunks.handler(), true).unwrap();

        device.enqueue_read(&[0xDE, 0xAD, 0xBE, 0xEF]);
        port.settle();

        assert_eq!(chunks.items(), vec![vec![0xDE, 0xAD, 0xBE, 0xEF]]);
        assert_eq!(device.available_bytes(), 0);
    }

    #[test]
    fn test_below_threshold_waits_for_more() {
        let (port, device) = open_mock_port();
        let chunks = Collector::<Vec<u8>>::new();
        port.on_n_bytes(4, chunks.handler(), true).unwrap();

        device.enqueue_read(&[1, 2, 3]);
        port.settle();
        assert_eq!(chunks.len(), 0);
        assert_eq!(device.available_bytes(), 3);

        device.enqueue_read(&[4]);
        port.settle();
        assert_eq!(chunks.items(), vec![vec![1, 2, 3, 4]]);
    }

    #[test]
    fn test_burst_yields_every_complete_chunk() {
        let (port, device) = open_mock_port();
        let chunks = Collector::<Vec<u8>>::new();
        port.on_n_bytes(2, chunks.handler(), true).unwrap();

        device.enqueue_read(&[1, 2, 3, 4, 5]);
        port.settle();

        assert_eq!(chunks.items(), vec![vec![1, 2], vec![3, 4]]);
        assert_eq!(device.available_bytes(), 1);
    }

    #[test]
    fn test_zero_size_is_rejected() {
        let (port, device) = open_mock_port();

        let err = port.on_n_bytes(0, |_| {}, true).unwrap_err();

        assert!(matches!(err, SerialError::InvalidFrameSize));
        assert_eq!(port.listener_state(), ListenerState::Unregistered);
        assert!(!device.is_armed());
    }
}

mod chunk_properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_chunks_have_exact_size_for_any_arrival_pattern(
            n in 1usize..8,
            bursts in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..12), 0..8),
        ) {
            let (port, device) = open_mock_port();
            let chunks = Collector::<Vec<u8>>::new();
            port.on_n_bytes(n, chunks.handler(), true).unwrap();

            for burst in &bursts {
                device.enqueue_read(burst);
            }
            port.settle();

            let input = bursts.concat();
            let complete = input.len() / n * n;
            let delivered = chunks.items();
            prop_assert!(delivered.iter().all(|chunk| chunk.len() == n));
            prop_assert_eq!(delivered.concat(), input[..complete].to_vec());
            prop_assert_eq!(device.available_bytes(), input.len() - complete);
        }
    }
}

// ============================================================================
// Registration, replacement and removal
// ============================================================================

mod registration {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_second_listener_is_rejected() {
        let (port, device) = open_mock_port();
        let first = Collector::<u8>::new();
        port.on_byte(first.handler(), true).unwrap();

        let err = port.on_n_bytes(2, |_| {}, true).unwrap_err();
        assert!(matches!(
            err,
            SerialError::ListenerAlreadyRegistered { ref path } if path == "MOCK0"
        ));

        // The first binding keeps working
        device.enqueue_read(&[7]);
        port.settle();
        assert_eq!(first.items(), vec![7]);
    }

    #[test]
    fn test_replace_stops_previous_listener() {
        let (port, device) = open_mock_port();
        let old = Collector::<u8>::new();
        let new = Collector::<u8>::new();
        port.on_byte(old.handler(), true).unwrap();
        device.enqueue_read(&[1]);
        port.settle();

        let outcome = port
            .register(
                serial_events::ByteFramer::new(new.handler()),
                ListenOptions::default().replacing(),
            )
            .unwrap();
        device.enqueue_read(&[2]);
        port.settle();

        assert_eq!(outcome, Registration::Replaced);
        assert_eq!(old.items(), vec![1]);
        assert_eq!(new.items(), vec![2]);
    }

    #[test]
    fn test_replace_on_empty_slot_registers() {
        let (port, _device) = open_mock_port();

        let outcome = port
            .register(
                serial_events::ByteFramer::new(|_| {}),
                ListenOptions::default().replacing(),
            )
            .unwrap();

        assert_eq!(outcome, Registration::Registered);
    }

    #[test]
    fn test_failed_replace_leaves_slot_unregistered() {
        // Arrange: a bound listener, then the device goes away underneath it
        let (port, device) = open_mock_port();
        port.on_byte(|_| {}, true).unwrap();
        let mut gone = device.clone();
        gone.close();

        // Act
        let err = port
            .register(
                serial_events::ByteFramer::new(|_| {}),
                ListenOptions::default().replacing(),
            )
            .unwrap_err();

        // Assert
        assert!(matches!(err, SerialError::TransportReadFailure { .. }));
        assert_eq!(port.listener_state(), ListenerState::Unregistered);
        assert!(!port.remove_listener());
    }

    #[test]
    fn test_remove_then_register_again() {
        let (port, device) = open_mock_port();
        port.on_byte(|_| {}, true).unwrap();

        assert!(port.remove_listener());
        assert!(!device.is_armed());
        assert!(!port.remove_listener(), "second remove is a no-op");

        let bytes = Collector::<u8>::new();
        port.on_byte(bytes.handler(), true).unwrap();
        device.enqueue_read(&[9]);
        port.settle();
        assert_eq!(bytes.items(), vec![9]);
    }

    #[test]
    fn test_data_after_remove_is_not_delivered() {
        let (port, device) = open_mock_port();
        let bytes = Collector::<u8>::new();
        port.on_byte(bytes.handler(), true).unwrap();

        port.remove_listener();
        device.enqueue_read(&[1, 2]);
        port.settle();

        assert_eq!(bytes.len(), 0);
        assert_eq!(device.available_bytes(), 2);
    }

    #[test]
    fn test_remove_without_listener_returns_false() {
        let (port, _device) = open_mock_port();
        assert!(!port.remove_listener());
    }
}

// ============================================================================
// Failures on the listener worker
// ============================================================================

mod faults {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_read_failure_reaches_error_handler() {
        // Arrange
        let (port, device) = open_mock_port();
        let errors = capture_errors(&port);
        port.on_byte(|_| {}, true).unwrap();

        // Act: the next read times out
        device.set_should_timeout(true);
        device.enqueue_read(&[1]);
        port.settle();

        // Assert
        let errors = errors.lock().unwrap().clone();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("Read from 'MOCK0' failed"), "{}", errors[0]);
        assert!(matches!(port.listener_state(), ListenerState::Faulted { .. }));
        assert!(!device.is_armed());
    }

    #[test]
    fn test_faulted_listener_does_not_block_registration() {
        let (port, device) = open_mock_port();
        port.on_byte(|_| {}, true).unwrap();
        device.set_should_timeout(true);
        device.enqueue_read(&[1]);
        port.settle();

        let bytes = Collector::<u8>::new();
        let outcome = port.on_byte(bytes.handler(), true).unwrap();
        device.enqueue_read(&[2]);
        port.settle();

        assert_eq!(outcome, Registration::Registered);
        assert_eq!(port.listener_state(), ListenerState::Armed);
        assert_eq!(bytes.items(), vec![2]);
    }

    #[test]
    fn test_callback_panic_faults_listener() {
        let (port, device) = open_mock_port();
        let errors = capture_errors(&port);
        port.on_byte(|_| panic!("boom"), true).unwrap();

        device.enqueue_read(&[1]);
        port.settle();

        let errors = errors.lock().unwrap().clone();
        assert_eq!(errors, vec!["Listener callback on 'MOCK0' panicked: boom".to_string()]);
        match port.listener_state() {
            ListenerState::Faulted { reason } => assert!(reason.contains("boom")),
            other => panic!("expected Faulted, got {other:?}"),
        }
    }

    #[test]
    fn test_raw_handler_error_faults_listener() {
        let (port, device) = open_mock_port();
        let errors = capture_errors(&port);
        port.listen(|_sink: &mut dyn ByteSink| Err(PortError::NotOpen), true)
            .unwrap();

        device.enqueue_read(&[1]);
        port.settle();

        assert_eq!(errors.lock().unwrap().len(), 1);
        assert!(matches!(port.listener_state(), ListenerState::Faulted { .. }));
    }
}

// ============================================================================
// Raw listeners and writes from callbacks
// ============================================================================

mod callbacks {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_raw_listener_reads_the_sink() {
        let (port, device) = open_mock_port();
        let seen = Collector::<u8>::new();
        let mut record = seen.handler();
        port.listen(
            move |sink: &mut dyn ByteSink| {
                while sink.available()? > 0 {
                    record(sink.read_byte()?);
                }
                Ok(())
            },
            true,
        )
        .unwrap();

        device.enqueue_read(b"ok");
        port.settle();

        assert_eq!(seen.items(), b"ok".to_vec());
    }

    #[test]
    fn test_callback_can_write_to_its_port() {
        // Arrange: echo every received byte plus one
        let (port, device) = open_mock_port();
        let port = Arc::new(port);
        let weak = Arc::downgrade(&port);
        port.on_byte(
            move |byte| {
                if let Some(port) = weak.upgrade() {
                    port.write(i64::from(byte) + 1).unwrap();
                }
            },
            true,
        )
        .unwrap();

        // Act
        device.enqueue_read(&[0x10, 0xFF]);
        port.settle();

        // Assert: 0xFF + 1 wraps to 0x00
        assert_eq!(device.written_bytes(), vec![0x11, 0x00]);
    }

    #[test]
    fn test_removing_own_listener_drops_rest_of_firing() {
        let (port, device) = open_mock_port();
        let port = Arc::new(port);
        let weak = Arc::downgrade(&port);
        let seen = Collector::<u8>::new();
        let mut record = seen.handler();
        port.on_byte(
            move |byte| {
                record(byte);
                if let Some(port) = weak.upgrade() {
                    port.remove_listener();
                }
            },
            true,
        )
        .unwrap();

        device.enqueue_read(&[1, 2, 3]);
        port.settle();

        assert_eq!(seen.items(), vec![1]);
        assert_eq!(port.listener_state(), ListenerState::Unregistered);
    }

    #[test]
    fn test_closing_port_from_callback_cancels_delivery() {
        let (port, device) = open_mock_port();
        let port = Arc::new(port);
        let weak = Arc::downgrade(&port);
        let seen = Collector::<Vec<u8>>::new();
        let mut record = seen.handler();
        port.on_n_bytes(
            1,
            move |chunk| {
                record(chunk);
                if let Some(port) = weak.upgrade() {
                    port.close();
                }
            },
            true,
        )
        .unwrap();

        device.enqueue_read(&[7, 8, 9]);
        port.settle();

        assert_eq!(seen.items(), vec![vec![7]]);
        assert!(port.is_closed());
    }

    #[test]
    fn test_settle_inside_callback_returns() {
        let (port, device) = open_mock_port();
        let port = Arc::new(port);
        let weak = Arc::downgrade(&port);
        let seen = Collector::<u8>::new();
        let mut record = seen.handler();
        port.on_byte(
            move |byte| {
                if let Some(port) = weak.upgrade() {
                    port.settle();
                }
                record(byte);
            },
            true,
        )
        .unwrap();

        device.enqueue_read(&[5]);
        port.settle();
        device.enqueue_read(&[6]);
        port.settle();

        assert_eq!(seen.items(), vec![5, 6]);
        assert_eq!(port.listener_state(), ListenerState::Armed);
    }
}

// ============================================================================
// Async consumers
// ============================================================================

mod subscriptions {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_subscribe_chunks_yields_frames() {
        let (port, device) = open_mock_port();
        let mut frames = port.subscribe_chunks(3, ListenOptions::default()).unwrap();

        device.enqueue_read(&[1, 2, 3, 4, 5, 6, 7]);

        let first = timeout(Duration::from_secs(2), frames.recv()).await.unwrap();
        let second = timeout(Duration::from_secs(2), frames.recv()).await.unwrap();
        assert_eq!(first, Some(vec![1, 2, 3]));
        assert_eq!(second, Some(vec![4, 5, 6]));
    }

    #[tokio::test]
    async fn test_subscription_ends_when_port_closes() {
        let (port, _device) = open_mock_port();
        let mut frames = port.subscribe_chunks(2, ListenOptions::default()).unwrap();

        port.close();

        let next = timeout(Duration::from_secs(2), frames.recv()).await.unwrap();
        assert_eq!(next, None);
    }

    #[test]
    fn test_dropped_subscriber_faults_and_keeps_bytes() {
        // Arrange
        let (port, device) = open_mock_port();
        let errors = capture_errors(&port);
        let frames = port.subscribe_chunks(2, ListenOptions::default()).unwrap();

        // Act
        drop(frames);
        device.enqueue_read(&[1, 2, 3, 4]);
        port.settle();

        // Assert: nothing was read on behalf of the missing consumer
        assert_eq!(device.available_bytes(), 4);
        assert!(!device.is_armed());
        assert_eq!(
            *errors.lock().unwrap(),
            vec!["Chunk subscriber on 'MOCK0' was dropped".to_string()]
        );
        assert!(matches!(port.listener_state(), ListenerState::Faulted { .. }));
    }
}
