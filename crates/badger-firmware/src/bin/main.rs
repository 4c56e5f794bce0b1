#![no_std]
#![no_main]

//! Badger 2040 firmware
//!
//! Core0 runs the main loop: buttons, session state, flushing and power.
//! Core1 runs its own executor hosting the acquisition worker, which owns the
//! SCD41 on I2C0. The two cores meet only in [`ACQUISITION`].
//!
//! | GPIO | Use                                  |
//! |------|--------------------------------------|
//! | 4/5  | I2C0 SDA/SCL (SCD41)                 |
//! | 10   | 3V3 enable, held high while awake    |
//! | 12   | Button A: badge screen               |
//! | 13   | Button B: air-quality dashboard      |
//! | 14   | Button C: contact screen             |

use embassy_executor::{Executor, Spawner};
use embassy_futures::select::select4;
use embassy_rp::bind_interrupts;
use embassy_rp::flash::{Blocking, Flash};
use embassy_rp::gpio::{Input, Level, Output, Pull};
use embassy_rp::i2c::{self, I2c};
use embassy_rp::multicore::{Stack, spawn_core1};
use embassy_rp::peripherals::I2C0;
use embassy_time::{Delay, Instant, Timer};
use log::info;
use static_cell::StaticCell;

use badger_core::acquisition::{
    AcquisitionScheduler, AcquisitionShared, AcquisitionWorker, PowerHint, SleepPolicy,
};
use badger_core::app_state::BadgeState;
use badger_core::config::{MIN_GAP, SHORT_POLL, STATE_FLASH_OFFSET};
use badger_core::sensors::Scd41Sensor;
use badger_core::storage::{FlashExclusion, Screen, StateStore};

const FLASH_SIZE: usize = 2 * 1024 * 1024;

static ACQUISITION: AcquisitionShared = AcquisitionShared::new();

static CORE1_STACK: StaticCell<Stack<8192>> = StaticCell::new();
static CORE1_EXECUTOR: StaticCell<Executor> = StaticCell::new();

bind_interrupts!(struct Irqs {
    I2C0_IRQ => i2c::InterruptHandler<I2C0>;
});

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    rtt_target::rprintln!("PANIC: {}", info);
    loop {}
}

struct Buttons {
    a: Input<'static>,
    b: Input<'static>,
    c: Input<'static>,
}

impl Buttons {
    /// The screen requested by a held button, A taking precedence.
    fn requested_screen(&self) -> Option<Screen> {
        if self.a.is_high() {
            Some(Screen::Badge)
        } else if self.b.is_high() {
            Some(Screen::AirQuality)
        } else if self.c.is_high() {
            Some(Screen::Contact)
        } else {
            None
        }
    }
}

#[embassy_executor::task]
async fn acquisition_task(i2c: I2c<'static, I2C0, i2c::Async>) -> ! {
    AcquisitionWorker::new(Scd41Sensor::new(i2c), Delay)
        .run(&ACQUISITION)
        .await
}

#[embassy_executor::main]
async fn main(_spawner: Spawner) -> ! {
    rtt_target::rtt_init_log!();

    let p = embassy_rp::init(Default::default());

    // Keep the board powered until the loop decides to halt
    let mut power = Output::new(p.PIN_10, Level::High);

    let mut buttons = Buttons {
        a: Input::new(p.PIN_12, Pull::Down),
        b: Input::new(p.PIN_13, Pull::Down),
        c: Input::new(p.PIN_14, Pull::Down),
    };

    let flash = Flash::<_, Blocking, FLASH_SIZE>::new_blocking(p.FLASH);
    // embassy-rp pauses core1 and masks interrupts around flash operations
    let mut store =
        StateStore::new(flash, STATE_FLASH_OFFSET).with_exclusion(FlashExclusion::Driver);
    let mut state = BadgeState::load(&mut store);

    // The button that woke the board counts as a press
    if let Some(screen) = buttons.requested_screen() {
        state.select_screen(screen);
    }

    let (i2c0, scl, sda) = (p.I2C0, p.PIN_5, p.PIN_4);
    spawn_core1(p.CORE1, CORE1_STACK.init_with(Stack::new), move || {
        let executor = CORE1_EXECUTOR.init(Executor::new());
        executor.run(|spawner| {
            // The I2C interrupt must be enabled on the core that services it
            let i2c = I2c::new_async(i2c0, scl, sda, Irqs, i2c::Config::default());
            spawner.spawn(acquisition_task(i2c).expect("acquisition task"));
        })
    });
    info!("Acquisition worker started on core1");

    let mut scheduler = AcquisitionScheduler::new(&ACQUISITION);

    loop {
        if let Some(screen) = buttons.requested_screen() {
            state.select_screen(screen);
        }

        let report = state.service(
            &mut scheduler,
            &mut store,
            Instant::now(),
            SleepPolicy::WaitForWorker,
        );
        if let Some(reading) = report.recorded {
            info!("Recorded {}", reading);
        }

        match report.power {
            PowerHint::ShortPoll => Timer::after(SHORT_POLL).await,
            PowerHint::Halt => {
                info!("Halting");
                power.set_low();

                // On battery the board is off by now. On USB power it keeps
                // running, so wait for a button or the next acquisition slot.
                select4(
                    buttons.a.wait_for_high(),
                    buttons.b.wait_for_high(),
                    buttons.c.wait_for_high(),
                    Timer::after(MIN_GAP),
                )
                .await;
                power.set_high();
            }
        }
    }
}
