#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
#![deny(clippy::large_stack_frames)]

use embassy_executor::Spawner;
use embassy_futures::select::{Either, select};
use embassy_net::{Runner, Stack, StackResources};
use embassy_time::Duration;
use esp_hal::Async;
use esp_hal::analog::dac::Dac;
use esp_hal::clock::CpuClock;
use esp_hal::delay::Delay;
use esp_hal::gpio::{DriveMode, Flex, Level, Output, OutputConfig, Pull};
use esp_hal::i2c::master::{Config as I2cConfig, I2c};
use esp_hal::pcnt::Pcnt;
use esp_hal::rng::Rng;
use esp_hal::time::Rate;
use esp_hal::timer::timg::TimerGroup;
use esp_hal::uart::{Config as UartConfig, Uart, UartRx, UartTx};
use esp_radio::wifi::WifiDevice;
use esp_storage::FlashStorage;
use log::{LevelFilter, error, info};
use static_cell::StaticCell;

use boat32_core::acquisition::Uplink;
use boat32_core::acquisition::auxiliary::AuxiliaryTask;
use boat32_core::acquisition::control::ControlTask;
use boat32_core::acquisition::instrumentation::InstrumentationTask;
use boat32_core::acquisition::position::PositionTask;
use boat32_core::acquisition::temperature::TemperatureTask;
use boat32_core::app_state::{TelemetryReader, TelemetryStore};
use boat32_core::calibration::CalibrationTiming;
use boat32_core::commands::CommandTask;
use boat32_core::config::{Config, ConfigError, CredentialTable, OverlayConfig};
use boat32_core::connectivity::overlay::{self, DisabledOverlay};
use boat32_core::connectivity::{ConnectivityManager, NetworkEvent};
use boat32_core::notify::{Mailboxes, Notifier};
use boat32_core::registry::{Diagnostics, Heartbeat, TaskId, TaskRegistry};
use boat32_core::request::RequestForwarder;
use boat32_core::sensors::{Ads1115, Ds18b20, PinBus};
use boat32_core::status::StatusIndicator;
use boat32_core::transport::{SerialLogger, SerialOutbox, run_writer};

use boat32_firmware::analog::{AuxAdc, AuxPins, ControlDac, PcntEncoder};
use boat32_firmware::flash::FlashPreferences;
use boat32_firmware::http::{NetHttpClient, serve_status_pages};
use boat32_firmware::indicator::BoardIndicator;
use boat32_firmware::mdns::advertise;
use boat32_firmware::halt;
use boat32_firmware::wifi::RadioLink;

const CONSOLE_BAUD: u32 = 4800;
const GPS_BAUD: u32 = 9600;

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    rtt_target::rprintln!("PANIC: {}", info);
    loop {}
}

extern crate alloc;

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

type Probes = Ds18b20<PinBus<Flex<'static>, Delay>>;
type FrontEnd = Ads1115<I2c<'static, Async>>;

static STORE: TelemetryStore = TelemetryStore::new();
static MAILBOXES: Mailboxes = Mailboxes::new();
static REGISTRY: TaskRegistry = TaskRegistry::new();
static OUTBOX: StaticCell<SerialOutbox> = StaticCell::new();
static LOGGER: StaticCell<SerialLogger> = StaticCell::new();
static CONFIG: StaticCell<Config> = StaticCell::new();
static GATES: StaticCell<[&'static Notifier<NetworkEvent>; 3]> = StaticCell::new();
static RADIO: StaticCell<esp_radio::Controller<'static>> = StaticCell::new();
static NET_RESOURCES: StaticCell<StackResources<6>> = StaticCell::new();

fn load_config() -> Result<Config, ConfigError> {
    let credentials = CredentialTable::parse(env!("BOAT32_WIFI_CREDENTIALS"))?;
    let overlay = OverlayConfig::new(
        env!("BOAT32_OVERLAY_HOSTNAME"),
        env!("BOAT32_OVERLAY_JOIN_CODE"),
        env!("BOAT32_OVERLAY_DASHBOARD"),
    )?;
    Ok(Config::new(credentials, overlay))
}

#[embassy_executor::task]
async fn net_task(mut runner: Runner<'static, WifiDevice<'static>>) -> ! {
    runner.run().await
}

#[embassy_executor::task]
async fn status_task(
    indicator: StatusIndicator<'static, BoardIndicator>,
    heartbeat: Heartbeat<'static>,
) -> ! {
    indicator.run(heartbeat).await
}

#[embassy_executor::task]
async fn writer_task(
    outbox: &'static SerialOutbox,
    port: UartTx<'static, Async>,
    heartbeat: Heartbeat<'static>,
) -> ! {
    run_writer(outbox, port, heartbeat).await
}

#[embassy_executor::task]
async fn command_task(
    task: CommandTask<'static, UartRx<'static, Async>>,
    heartbeat: Heartbeat<'static>,
) -> ! {
    task.run(heartbeat).await
}

#[embassy_executor::task]
async fn connectivity_task(
    manager: ConnectivityManager<'static, RadioLink>,
    heartbeat: Heartbeat<'static>,
) -> ! {
    manager.run(heartbeat).await
}

#[embassy_executor::task]
async fn status_server_task(
    stack: Stack<'static>,
    reader: TelemetryReader<'static>,
    credentials: &'static CredentialTable,
    heartbeat: Heartbeat<'static>,
) -> ! {
    MAILBOXES.server_gate.wait().await;
    match select(
        serve_status_pages(stack, reader, credentials, heartbeat),
        advertise(stack),
    )
    .await
    {
        Either::First(never) | Either::Second(never) => never,
    }
}

#[embassy_executor::task]
async fn request_task(
    forwarder: RequestForwarder<'static, NetHttpClient>,
    heartbeat: Heartbeat<'static>,
) -> ! {
    forwarder.run(heartbeat).await
}

#[embassy_executor::task]
async fn temperature_task(
    task: TemperatureTask<'static, Probes>,
    heartbeat: Heartbeat<'static>,
) -> ! {
    task.run(heartbeat).await
}

#[embassy_executor::task]
async fn position_task(
    task: PositionTask<'static, UartRx<'static, Async>>,
    heartbeat: Heartbeat<'static>,
) -> ! {
    task.run(heartbeat).await
}

#[embassy_executor::task]
async fn instrumentation_task(
    task: InstrumentationTask<'static, FrontEnd>,
    heartbeat: Heartbeat<'static>,
) -> ! {
    task.run(heartbeat).await
}

#[embassy_executor::task]
async fn auxiliary_task(
    task: AuxiliaryTask<'static, AuxAdc, FlashPreferences>,
    heartbeat: Heartbeat<'static>,
) -> ! {
    task.run(heartbeat).await
}

#[embassy_executor::task]
async fn control_task(
    task: ControlTask<'static, PcntEncoder, ControlDac>,
    heartbeat: Heartbeat<'static>,
) -> ! {
    task.run(heartbeat).await
}

#[allow(
    clippy::large_stack_frames,
    reason = "it's not unusual to allocate larger buffers etc. in main"
)]
#[esp_rtos::main]
async fn main(spawner: Spawner) -> ! {
    rtt_target::rtt_init_print!();

    let hal_config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(hal_config);

    esp_alloc::heap_allocator!(#[esp_hal::ram(reclaimed)] size: 73744);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    let config: &'static Config = match load_config() {
        Ok(config) => CONFIG.init(config),
        Err(e) => halt(&e),
    };
    let outbox: &'static SerialOutbox = OUTBOX.init(SerialOutbox::new(
        config.telemetry.system_id,
        config.telemetry.component_id,
    ));
    if let Err(e) = LOGGER
        .init(SerialLogger::new(outbox, LevelFilter::Info))
        .install()
    {
        rtt_target::rprintln!("Logger not installed: {}", e);
    }
    info!("Starting boat32");

    let Some(writers) = STORE.writers() else {
        halt(&"store writers already taken")
    };

    // Serial console: operator commands in, telemetry frames and log lines out.
    let console = match Uart::new(
        peripherals.UART0,
        UartConfig::default().with_baudrate(CONSOLE_BAUD),
    ) {
        Ok(uart) => uart
            .with_rx(peripherals.GPIO3)
            .with_tx(peripherals.GPIO1)
            .into_async(),
        Err(e) => halt(&e),
    };
    let (console_rx, console_tx) = console.split();

    let gps = match UartRx::new(peripherals.UART2, UartConfig::default().with_baudrate(GPS_BAUD)) {
        Ok(rx) => rx.with_rx(peripherals.GPIO16).into_async(),
        Err(e) => halt(&e),
    };

    let i2c = match I2c::new(
        peripherals.I2C0,
        I2cConfig::default().with_frequency(Rate::from_khz(400)),
    ) {
        Ok(i2c) => i2c
            .with_sda(peripherals.GPIO21)
            .with_scl(peripherals.GPIO22)
            .into_async(),
        Err(e) => halt(&e),
    };

    // One-wire data line: open drain with the pull-up, readable while driven.
    let mut one_wire = Flex::new(peripherals.GPIO15);
    one_wire.apply_output_config(
        &OutputConfig::default()
            .with_drive_mode(DriveMode::OpenDrain)
            .with_pull(Pull::Up),
    );
    one_wire.set_input_enable(true);
    one_wire.set_output_enable(true);
    one_wire.set_high();

    let indicator = BoardIndicator::new(
        Output::new(peripherals.GPIO2, Level::Low, OutputConfig::default()),
        Dac::new(peripherals.DAC2, peripherals.GPIO26),
    );
    let auxiliary = AuxAdc::new(
        peripherals.ADC1,
        AuxPins {
            battery_voltage: peripherals.GPIO34,
            battery_current: peripherals.GPIO35,
            port_pump: peripherals.GPIO36,
            starboard_pump: peripherals.GPIO39,
        },
    );
    let pcnt = Pcnt::new(peripherals.PCNT);
    let encoder = PcntEncoder::new(
        pcnt.unit0,
        peripherals.GPIO12,
        peripherals.GPIO14,
        peripherals.GPIO27,
    );
    let control_dac = ControlDac::new(Dac::new(peripherals.DAC1, peripherals.GPIO25));
    let preferences = FlashPreferences::open(FlashStorage::new(peripherals.FLASH));

    let radio = match esp_radio::init() {
        Ok(radio) => RADIO.init(radio),
        Err(e) => halt(&format_args!("radio init failed: {:?}", e)),
    };
    let (controller, interfaces) =
        match esp_radio::wifi::new(radio, peripherals.WIFI, Default::default()) {
            Ok(wifi) => wifi,
            Err(e) => halt(&format_args!("Wi-Fi init failed: {:?}", e)),
        };

    let rng = Rng::new();
    let seed = (rng.random() as u64) << 32 | rng.random() as u64;
    let (stack, runner) = embassy_net::new(
        interfaces.sta,
        embassy_net::Config::dhcpv4(Default::default()),
        NET_RESOURCES.init(StackResources::new()),
        seed,
    );

    let uplink = Uplink {
        outbox,
        status: &MAILBOXES.status,
        debug: STORE.debug(),
    };
    let timings = config.timings;
    let period = Duration::from_millis;

    let spawned = [
        spawner.spawn(net_task(runner)),
        spawner.spawn(status_task(
            StatusIndicator::new(indicator, &MAILBOXES.status),
            REGISTRY.heartbeat(TaskId::Status),
        )),
        spawner.spawn(writer_task(
            outbox,
            console_tx,
            REGISTRY.heartbeat(TaskId::SerialWriter),
        )),
        spawner.spawn(command_task(
            CommandTask::new(console_rx, &MAILBOXES),
            REGISTRY.heartbeat(TaskId::Commands),
        )),
        spawner.spawn(connectivity_task(
            ConnectivityManager::new(
                RadioLink::new(controller),
                &config.credentials,
                config.connectivity,
                &MAILBOXES.status,
                GATES.init(MAILBOXES.network_gates()),
                writers.link,
            ),
            REGISTRY.heartbeat(TaskId::Connectivity),
        )),
        spawner.spawn(status_server_task(
            stack,
            STORE.reader(),
            &config.credentials,
            REGISTRY.heartbeat(TaskId::StatusServer),
        )),
        spawner.spawn(request_task(
            RequestForwarder::new(
                NetHttpClient::new(stack),
                &MAILBOXES.request_gate,
                &MAILBOXES.requests,
            ),
            REGISTRY.heartbeat(TaskId::Requests),
        )),
        spawner.spawn(temperature_task(
            TemperatureTask::new(
                Ds18b20::new(PinBus::new(one_wire, Delay::new())),
                config.probes,
                writers.temperatures,
                uplink,
                &MAILBOXES.temperature,
                period(timings.temperature_ms),
            ),
            REGISTRY.heartbeat(TaskId::Temperature),
        )),
        spawner.spawn(position_task(
            PositionTask::new(
                gps,
                writers.position,
                uplink,
                &MAILBOXES.position,
                period(timings.position_ms),
            ),
            REGISTRY.heartbeat(TaskId::Position),
        )),
        spawner.spawn(instrumentation_task(
            InstrumentationTask::new(
                Ads1115::new(i2c),
                writers.instrumentation,
                uplink,
                period(timings.instrumentation_ms),
            ),
            REGISTRY.heartbeat(TaskId::Instrumentation),
        )),
        spawner.spawn(auxiliary_task(
            AuxiliaryTask::new(
                auxiliary,
                preferences,
                writers.auxiliary,
                &MAILBOXES.auxiliary,
                &MAILBOXES.status,
                STORE.debug(),
                CalibrationTiming::default(),
                period(timings.auxiliary_ms),
            ),
            REGISTRY.heartbeat(TaskId::Auxiliary),
        )),
        spawner.spawn(control_task(
            ControlTask::new(
                encoder,
                control_dac,
                writers.control,
                STORE.debug(),
                period(timings.control_ms),
            ),
            REGISTRY.heartbeat(TaskId::Control),
        )),
    ];
    if let Some(Err(e)) = spawned.into_iter().find(Result::is_err) {
        error!("Could not spawn task: {:?}", e);
        halt(&"task spawn failed");
    }

    if let Err(e) =
        overlay::bootstrap(&MAILBOXES.overlay_gate, &mut DisabledOverlay, &config.overlay).await
    {
        error!(target: "vpn", "Overlay unavailable: {}", e);
    }

    Diagnostics {
        registry: &REGISTRY,
        debug: STORE.debug(),
        free_heap: || esp_alloc::HEAP.free(),
        period: period(timings.diagnostics_ms),
    }
    .run(REGISTRY.heartbeat(TaskId::Diagnostics))
    .await
}
