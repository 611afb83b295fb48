//! Desktop simulator for the boat32 telemetry companion.
//!
//! Runs every boat32-core task on the host embassy executor against
//! synthetic sensors, so the command set, the uplink and the status pages
//! can be exercised without a boat.
//!
//! Commands are typed on stdin (`B0`, `G2`, `T`, `Rhttp://...`, `Q`, `C12.5`).
//! Telemetry frames are decoded and printed on stdout; logs go to stderr
//! through `env_logger` (`RUST_LOG=debug` for everything).
//!
//! # Environment
//!
//! | Variable                  | Default                                 |
//! |---------------------------|-----------------------------------------|
//! | `BOAT32_WIFI_CREDENTIALS` | `boat-hotspot:sailfast;harbour:moorings`|
//! | `BOAT32_SIM_REACHABLE`    | `harbour`                               |
//! | `BOAT32_STATUS_ADDR`      | `127.0.0.1:8080`                        |
//! | `BOAT32_PREFERENCES`      | `boat32-preferences.bin`                |

mod console;
mod mock;
mod network;
mod preferences;

use embassy_executor::Spawner;
use embassy_time::Duration;
use log::{error, info};
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
use boat32_core::config::{Config, CredentialTable, OverlayConfig};
use boat32_core::connectivity::overlay;
use boat32_core::connectivity::{ConnectivityManager, NetworkEvent};
use boat32_core::notify::{Mailboxes, Notifier};
use boat32_core::registry::{Diagnostics, Heartbeat, TaskId, TaskRegistry};
use boat32_core::request::RequestForwarder;
use boat32_core::status::StatusIndicator;
use boat32_core::transport::{SerialOutbox, run_writer};

use console::{ConsoleIndicator, ConsoleInput, ConsoleOutput};
use mock::{MockAuxiliary, MockDac, MockEncoder, MockFrontEnd, MockGps, MockProbes};
use network::{HostHttpClient, SimulatedLink, SimulatedOverlay};
use preferences::FilePreferences;

static STORE: TelemetryStore = TelemetryStore::new();
static MAILBOXES: Mailboxes = Mailboxes::new();
static REGISTRY: TaskRegistry = TaskRegistry::new();
static OUTBOX: StaticCell<SerialOutbox> = StaticCell::new();
static CONFIG: StaticCell<Config> = StaticCell::new();
static GATES: StaticCell<[&'static Notifier<NetworkEvent>; 3]> = StaticCell::new();

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.into())
}

fn load_config() -> Result<Config, boat32_core::config::ConfigError> {
    let credentials = CredentialTable::parse(&env_or(
        "BOAT32_WIFI_CREDENTIALS",
        "boat-hotspot:sailfast;harbour:moorings",
    ))?;
    let overlay = OverlayConfig::new("boat32-sim", "simulated-join-code", "sim.invalid")?;
    Ok(Config::new(credentials, overlay))
}

#[embassy_executor::task]
async fn status_task(
    indicator: StatusIndicator<'static, ConsoleIndicator>,
    heartbeat: Heartbeat<'static>,
) -> ! {
    indicator.run(heartbeat).await
}

#[embassy_executor::task]
async fn writer_task(outbox: &'static SerialOutbox, heartbeat: Heartbeat<'static>) -> ! {
    run_writer(outbox, ConsoleOutput::default(), heartbeat).await
}

#[embassy_executor::task]
async fn command_task(
    task: CommandTask<'static, ConsoleInput>,
    heartbeat: Heartbeat<'static>,
) -> ! {
    task.run(heartbeat).await
}

#[embassy_executor::task]
async fn connectivity_task(
    manager: ConnectivityManager<'static, SimulatedLink>,
    heartbeat: Heartbeat<'static>,
) -> ! {
    manager.run(heartbeat).await
}

#[embassy_executor::task]
async fn status_server_task(
    address: String,
    reader: TelemetryReader<'static>,
    credentials: &'static CredentialTable,
    heartbeat: Heartbeat<'static>,
) {
    MAILBOXES.server_gate.wait().await;
    network::spawn_status_server(address, reader, credentials, heartbeat);
}

#[embassy_executor::task]
async fn request_task(
    forwarder: RequestForwarder<'static, HostHttpClient>,
    heartbeat: Heartbeat<'static>,
) -> ! {
    forwarder.run(heartbeat).await
}

#[embassy_executor::task]
async fn temperature_task(
    task: TemperatureTask<'static, MockProbes>,
    heartbeat: Heartbeat<'static>,
) -> ! {
    task.run(heartbeat).await
}

#[embassy_executor::task]
async fn position_task(task: PositionTask<'static, MockGps>, heartbeat: Heartbeat<'static>) -> ! {
    task.run(heartbeat).await
}

#[embassy_executor::task]
async fn instrumentation_task(
    task: InstrumentationTask<'static, MockFrontEnd>,
    heartbeat: Heartbeat<'static>,
) -> ! {
    task.run(heartbeat).await
}

#[embassy_executor::task]
async fn auxiliary_task(
    task: AuxiliaryTask<'static, MockAuxiliary, FilePreferences>,
    heartbeat: Heartbeat<'static>,
) -> ! {
    task.run(heartbeat).await
}

#[embassy_executor::task]
async fn control_task(
    task: ControlTask<'static, MockEncoder, MockDac>,
    heartbeat: Heartbeat<'static>,
) -> ! {
    task.run(heartbeat).await
}

fn host_free_heap() -> usize {
    // The host allocator keeps no free-space figure.
    0
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    env_logger::init();
    info!("Starting boat32 simulator");

    let config: &'static Config = match load_config() {
        Ok(config) => CONFIG.init(config),
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };
    let Some(writers) = STORE.writers() else {
        error!("Store writers already taken");
        std::process::exit(1);
    };

    let outbox: &'static SerialOutbox = OUTBOX.init(SerialOutbox::new(
        config.telemetry.system_id,
        config.telemetry.component_id,
    ));
    let uplink = Uplink {
        outbox,
        status: &MAILBOXES.status,
        debug: STORE.debug(),
    };
    let timings = config.timings;
    let period = Duration::from_millis;

    console::spawn_stdin_reader();

    let spawned = [
        spawner.spawn(status_task(
            StatusIndicator::new(ConsoleIndicator, &MAILBOXES.status),
            REGISTRY.heartbeat(TaskId::Status),
        )),
        spawner.spawn(writer_task(outbox, REGISTRY.heartbeat(TaskId::SerialWriter))),
        spawner.spawn(command_task(
            CommandTask::new(ConsoleInput, &MAILBOXES),
            REGISTRY.heartbeat(TaskId::Commands),
        )),
        spawner.spawn(connectivity_task(
            ConnectivityManager::new(
                SimulatedLink::new(env_or("BOAT32_SIM_REACHABLE", "harbour")),
                &config.credentials,
                config.connectivity,
                &MAILBOXES.status,
                GATES.init(MAILBOXES.network_gates()),
                writers.link,
            ),
            REGISTRY.heartbeat(TaskId::Connectivity),
        )),
        spawner.spawn(status_server_task(
            env_or("BOAT32_STATUS_ADDR", "127.0.0.1:8080"),
            STORE.reader(),
            &config.credentials,
            REGISTRY.heartbeat(TaskId::StatusServer),
        )),
        spawner.spawn(request_task(
            RequestForwarder::new(HostHttpClient, &MAILBOXES.request_gate, &MAILBOXES.requests),
            REGISTRY.heartbeat(TaskId::Requests),
        )),
        spawner.spawn(temperature_task(
            TemperatureTask::new(
                MockProbes::new(config.probes.motor),
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
                MockGps::default(),
                writers.position,
                uplink,
                &MAILBOXES.position,
                period(timings.position_ms),
            ),
            REGISTRY.heartbeat(TaskId::Position),
        )),
        spawner.spawn(instrumentation_task(
            InstrumentationTask::new(
                MockFrontEnd::default(),
                writers.instrumentation,
                uplink,
                period(timings.instrumentation_ms),
            ),
            REGISTRY.heartbeat(TaskId::Instrumentation),
        )),
        spawner.spawn(auxiliary_task(
            AuxiliaryTask::new(
                MockAuxiliary,
                FilePreferences::open(env_or("BOAT32_PREFERENCES", "boat32-preferences.bin")),
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
                MockEncoder::default(),
                MockDac::default(),
                writers.control,
                STORE.debug(),
                period(timings.control_ms),
            ),
            REGISTRY.heartbeat(TaskId::Control),
        )),
    ];
    if let Some(Err(e)) = spawned.into_iter().find(Result::is_err) {
        error!("Could not spawn task: {:?}", e);
        std::process::exit(1);
    }

    if let Err(e) =
        overlay::bootstrap(&MAILBOXES.overlay_gate, &mut SimulatedOverlay, &config.overlay).await
    {
        error!(target: "vpn", "Overlay unavailable: {}", e);
    }

    Diagnostics {
        registry: &REGISTRY,
        debug: STORE.debug(),
        free_heap: host_free_heap as fn() -> usize,
        period: period(timings.diagnostics_ms),
    }
    .run(REGISTRY.heartbeat(TaskId::Diagnostics))
    .await
}
