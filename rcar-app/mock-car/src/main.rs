use std::{
    convert::Infallible,
    fs::File,
    io::{self, BufRead, BufReader, Read},
    path::{Path, PathBuf},
    process::ExitCode,
};

use clap::{Parser, ValueEnum};
use embedded_hal::i2c::{ErrorType, I2c, Operation};
use pwm_pca9685::{Address as PwmAddress, Pca9685};
use rcar_core::utils::{
    config::CarConfig,
    controllers::{
        input::{DeviceMap, JsEvent, JS_EVENT_LEN},
        pwm::configure_pca9685,
        ControlCommand, ControlSurface, InputBindings, PwmBus,
    },
    VehicleController,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum BusKind {
    /// Log each channel pulse.
    Log,
    /// Drive a PCA9685 driver over an I2C bus that logs raw transfers.
    Pca9685,
}

#[derive(Parser)]
#[clap(version = "1.0", about = "Run the RC car controller against a logging PWM bus")]
struct Opts {
    /// JSON car configuration; built-in defaults when omitted
    #[clap(long)]
    config: Option<PathBuf>,
    /// JSON lines of control commands (stdin when neither input is given)
    #[clap(long, conflicts_with = "js")]
    script: Option<PathBuf>,
    /// Raw joystick event dump, as read from /dev/input/jsN
    #[clap(long)]
    js: Option<PathBuf>,
    /// Bus the controller writes to
    #[clap(long, value_enum, default_value = "log")]
    bus: BusKind,
    /// Log filter used when RUST_LOG is unset
    #[clap(long, default_value = "info")]
    log_level: String,
}

/// PWM bus that prints each pulse instead of touching hardware.
#[derive(Debug, Default)]
struct LoggingBus;

impl PwmBus for LoggingBus {
    type Error = Infallible;

    fn set_pulse(
        &mut self,
        channel: u8,
        on: u16,
        off: u16,
    ) -> Result<(), Self::Error> {
        info!(channel, on, off, "pwm");
        Ok(())
    }
}

/// I2C bus that prints every write and reads back zeros.
#[derive(Debug, Default)]
struct LoggingI2c;

impl ErrorType for LoggingI2c {
    type Error = Infallible;
}

impl I2c for LoggingI2c {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        for op in operations {
            match op {
                Operation::Write(bytes) => info!(address, ?bytes, "i2c write"),
                Operation::Read(buf) => buf.fill(0),
            }
        }
        Ok(())
    }
}

enum Input {
    Script(Box<dyn BufRead>),
    Joystick(PathBuf),
}

fn run<B>(
    bus: B,
    config: &CarConfig,
    input: Input,
) -> Result<(), Box<dyn std::error::Error>>
where
    B: PwmBus + Send + 'static,
{
    let mut ctrl = VehicleController::new(bus, config)?;
    ctrl.on_connected();

    let fed = match input {
        Input::Script(reader) => feed_script(&mut ctrl, reader),
        Input::Joystick(path) => feed_joystick(&mut ctrl, &path),
    };

    ctrl.on_disconnected();
    let stats = ctrl.stats();
    if ctrl.close().is_none() {
        error!("dispatch worker did not exit cleanly");
    }
    info!(
        written = stats.written,
        coalesced = stats.coalesced,
        dropped = stats.dropped,
        "done"
    );
    fed
}

fn feed_script<B>(
    ctrl: &mut VehicleController<B>,
    reader: Box<dyn BufRead>,
) -> Result<(), Box<dyn std::error::Error>>
where
    B: PwmBus + Send + 'static,
{
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match serde_json::from_str::<ControlCommand>(line) {
            Ok(command) => ctrl.apply(command),
            Err(e) => warn!(line = lineno + 1, error = %e, "skipping malformed command"),
        }
    }
    Ok(())
}

fn feed_joystick<B>(
    ctrl: &mut VehicleController<B>,
    path: &Path,
) -> Result<(), Box<dyn std::error::Error>>
where
    B: PwmBus + Send + 'static,
{
    let mut raw = Vec::new();
    File::open(path)?.read_to_end(&mut raw)?;

    let bindings = InputBindings::default();
    let device = DeviceMap::default();
    let records = raw.chunks_exact(JS_EVENT_LEN);
    if !records.remainder().is_empty() {
        warn!(trailing = records.remainder().len(), "ignoring partial trailing event");
    }
    for record in records {
        match JsEvent::decode(record) {
            Ok(event) => {
                bindings.dispatch(&event, &device, ctrl);
            }
            Err(e) => warn!(error = %e, "skipping joystick record"),
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let opts: Opts = Opts::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&opts.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = match &opts.config {
        Some(path) => match CarConfig::from_path(path) {
            Ok(config) => config,
            Err(e) => {
                error!(path = %path.display(), error = %e, "failed to load config");
                return ExitCode::FAILURE;
            }
        },
        None => CarConfig::default(),
    };

    let input = match (&opts.script, &opts.js) {
        (_, Some(js)) => Input::Joystick(js.clone()),
        (Some(script), None) => match File::open(script) {
            Ok(file) => Input::Script(Box::new(BufReader::new(file))),
            Err(e) => {
                error!(path = %script.display(), error = %e, "failed to open script");
                return ExitCode::FAILURE;
            }
        },
        (None, None) => Input::Script(Box::new(io::stdin().lock())),
    };

    let result = match opts.bus {
        BusKind::Log => run(LoggingBus, &config, input),
        BusKind::Pca9685 => {
            let mut pwm = match Pca9685::new(LoggingI2c, PwmAddress::default()) {
                Ok(pwm) => pwm,
                Err(e) => {
                    error!(error = ?e, "PCA9685 init failed");
                    return ExitCode::FAILURE;
                }
            };
            if let Err(e) = configure_pca9685(&mut pwm, config.pwm.prescale) {
                error!(error = ?e, "PCA9685 configuration failed");
                return ExitCode::FAILURE;
            }
            run(pwm, &config, input)
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "mock car failed");
            ExitCode::FAILURE
        }
    }
}
