//! PIT (8253/8254) configuration: reprogram channel 0 for periodic IRQ0
//! ticks. [`crate::arch::x86_64::idt`]'s timer handler converts each tick
//! into a [`crate::timer::timer_tick`] call and a scheduler preemption check.

/// Configure PIT channel 0 to fire IRQ0 every `interval_ms` milliseconds.
pub fn setup_timer(interval_ms: u32) {
    const PIT_FREQUENCY: u32 = 1193182; // Hz
    let divisor = PIT_FREQUENCY / (1000 / interval_ms);

    // SAFETY: ports 0x43/0x40 are the PIT's command and channel-0 data
    // ports. Writing the mode-3 command byte followed by a 16-bit divisor
    // (lobyte/hibyte) is the documented 8253/8254 programming sequence.
    unsafe {
        use x86_64::instructions::port::Port;

        let mut cmd_port: Port<u8> = Port::new(0x43);
        let mut data_port: Port<u8> = Port::new(0x40);

        cmd_port.write(0x36); // channel 0, lobyte/hibyte, rate generator
        data_port.write((divisor & 0xFF) as u8);
        data_port.write((divisor >> 8) as u8);
    }

    log::info!("[TIMER] PIT configured for {interval_ms}ms intervals");
}
