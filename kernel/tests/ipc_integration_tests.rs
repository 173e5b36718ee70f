//! Integration coverage for the bounded IPC ring queue against a running
//! kernel image rather than a host unit test. Runs before the bootstrap
//! sequence brings up the heap (like `basic_boot`), so it sticks to
//! `Queue`/`Caps`, which are plain stack data with no allocation involved.
//! `harness = false`: pass/fail is reported through the QEMU
//! `isa-debug-exit` device.

#![no_std]
#![no_main]

use core::panic::PanicInfo;

use nitros_kernel::ipc::{Caps, IpcError, Message, Queue, IPC_MSG_DATA_MAX, QUEUE_CAPACITY};
use nitros_kernel::{exit_qemu, serial_println, test_panic_handler, QemuExitCode};

#[unsafe(no_mangle)]
pub extern "C" fn _start() -> ! {
    serial_println!("Starting IPC integration tests...");

    test_capability_enforcement();
    test_fifo_ordering();
    test_full_queue_rejected();
    test_oversized_payload_rejected();
    test_revoke_removes_capability();

    serial_println!("All tests passed!");
    exit_qemu(QemuExitCode::Success)
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    test_panic_handler(info)
}

/// S2: a sender with only SEND and a receiver with only RECV can complete
/// one round trip; neither can do the other's job.
fn test_capability_enforcement() {
    let queue = Queue::new();
    queue.grant(1, Caps::SEND);
    queue.grant(2, Caps::RECV);

    let msg = Message::with_payload(7, 1, 2, b"ping");
    queue.send(1, msg).expect("sender with SEND must succeed");

    let received = queue.receive(2).expect("receiver with RECV must succeed");
    assert_eq!(received.msg_type, 7);
    assert_eq!(received.sender, 1);
    assert_eq!(&received.data[..4], b"ping");

    assert_eq!(queue.send(2, Message::empty()), Err(IpcError::NoCapability));
    assert_eq!(queue.receive(1), Err(IpcError::NoCapability));
    serial_println!("test_capability_enforcement passed");
}

fn test_fifo_ordering() {
    let queue = Queue::new();
    queue.grant(1, Caps::SEND | Caps::RECV);

    for i in 0..8u32 {
        queue
            .send(1, Message::with_payload(i, 0, 0, &[]))
            .expect("send within capacity must succeed");
    }
    for i in 0..8u32 {
        assert_eq!(queue.receive(1).unwrap().msg_type, i);
    }
    assert!(queue.is_empty());
    serial_println!("test_fifo_ordering passed");
}

fn test_full_queue_rejected() {
    let queue = Queue::new();
    queue.grant(1, Caps::SEND);
    for _ in 0..QUEUE_CAPACITY {
        queue.send(1, Message::empty()).unwrap();
    }
    assert!(queue.is_full());
    assert_eq!(queue.send(1, Message::empty()), Err(IpcError::Unavailable));
    serial_println!("test_full_queue_rejected passed");
}

fn test_oversized_payload_rejected() {
    let queue = Queue::new();
    queue.grant(1, Caps::SEND);
    let mut msg = Message::empty();
    msg.len = (IPC_MSG_DATA_MAX + 1) as u32;
    assert_eq!(queue.send(1, msg), Err(IpcError::PayloadTooLarge));
    serial_println!("test_oversized_payload_rejected passed");
}

fn test_revoke_removes_capability() {
    let queue = Queue::new();
    queue.grant(1, Caps::SEND | Caps::RECV);
    queue.revoke(1, Caps::SEND);
    assert!(!queue.has(1, Caps::SEND));
    assert!(queue.has(1, Caps::RECV));
    serial_println!("test_revoke_removes_capability passed");
}
