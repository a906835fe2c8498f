//! smartwave-uart
//!
//! Demo driver for the two SmartWave FPGA UARTs. UART0 listens on A2 and
//! UART1 transmits on A3, so jumpering A3 to A2 loops UART1 back into UART0.
//!
//! Usage:
//!   smartwave-uart --link serial:/dev/ttyACM0 receive
//!   smartwave-uart --link usb:<vid>:<pid> --baud 9600 --parity odd transmit
//!   smartwave-uart --link sim loopback

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use futures_channel::mpsc;
use futures_lite::{future, StreamExt};
use log::{info, warn};

use smartwave_uart::link::{SerialLink, UsbLink};
use smartwave_uart::sim::SimulatedDevice;
use smartwave_uart::{
    ChannelId, DrainPolicy, Error, Parity, RegisterAccess, SharedUart, ShiftDirection, StopBits,
    Uart, UartConfig,
};

#[derive(Parser, Debug)]
#[command(name = "smartwave-uart")]
#[command(about = "Drive the SmartWave FPGA UARTs over a register link")]
struct Args {
    /// Device link: `serial:PATH`, `usb:VID:PID` (hex) or `sim`
    #[arg(long, value_parser = parse_link)]
    link: LinkTarget,

    /// Serial link speed (only used with `serial:`)
    #[arg(long, default_value_t = 921_600)]
    link_baud: u32,

    /// UART baud rate
    #[arg(long, default_value_t = 115_200)]
    baud: u32,

    #[arg(long, value_enum, default_value_t = Parity::None)]
    parity: Parity,

    #[arg(long, value_enum, default_value_t = StopBits::One)]
    stop_bits: StopBits,

    #[arg(long, value_enum, default_value_t = ShiftDirection::LsbFirst)]
    shift: ShiftDirection,

    /// Bits per character
    #[arg(long, default_value_t = 8)]
    word_length: u8,

    /// Receive timeout in microseconds (10 µs resolution, max 10230)
    #[arg(long, default_value_t = 10_230)]
    timeout_us: u32,

    /// Pause between loop iterations in milliseconds
    #[arg(long, default_value_t = 2_000)]
    interval_ms: u64,

    /// Read passes a single drain may take before reporting a timeout
    #[arg(long, default_value_t = 64)]
    max_drain_passes: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Drain UART0 every interval and print what arrived
    Receive,
    /// Send 0..=254 on UART1 every interval
    Transmit,
    /// Cycle four payloads on UART1 and print whatever UART0 picks up
    Loopback,
    /// Transmit on UART1 and receive on UART0 from separate threads
    Duplex,
}

#[derive(Debug, Clone)]
enum LinkTarget {
    Serial(String),
    Usb { vid: u16, pid: u16 },
    Simulated,
}

fn parse_link(s: &str) -> std::result::Result<LinkTarget, String> {
    if s == "sim" {
        return Ok(LinkTarget::Simulated);
    }
    if let Some(path) = s.strip_prefix("serial:") {
        return Ok(LinkTarget::Serial(path.to_string()));
    }
    if let Some(ids) = s.strip_prefix("usb:") {
        let (vid, pid) = ids
            .split_once(':')
            .ok_or_else(|| format!("expected usb:VID:PID, got `{}`", s))?;
        let vid = u16::from_str_radix(vid, 16).map_err(|e| format!("bad VID: {}", e))?;
        let pid = u16::from_str_radix(pid, 16).map_err(|e| format!("bad PID: {}", e))?;
        return Ok(LinkTarget::Usb { vid, pid });
    }
    Err(format!("unknown link `{}`", s))
}

type Link = Box<dyn RegisterAccess + Send>;

fn open_link(args: &Args) -> Result<Link> {
    Ok(match &args.link {
        LinkTarget::Serial(path) => Box::new(
            SerialLink::open(path, args.link_baud)
                .with_context(|| format!("Failed to open serial link {}", path))?,
        ),
        LinkTarget::Usb { vid, pid } => Box::new(
            UsbLink::open(*vid, *pid)
                .with_context(|| format!("Failed to open USB link {:04x}:{:04x}", vid, pid))?,
        ),
        LinkTarget::Simulated => Box::new(SimulatedDevice::new()),
    })
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let config = UartConfig::default()
        .with_baud_rate(args.baud)
        .with_parity(args.parity)
        .with_stop_bits(args.stop_bits)
        .with_shift_direction(args.shift)
        .with_word_length(args.word_length)
        .with_timeout_us(args.timeout_us);

    let interval = Duration::from_millis(args.interval_ms);
    let safe = config.max_safe_poll_interval();
    info!("Max safe poll interval at this line rate: {:?}", safe);
    if interval > safe {
        warn!(
            "Polling every {:?} can lose data if the line stays busy for more than {:?}",
            interval, safe
        );
    }

    let link = open_link(&args)?;
    let mut uart = Uart::new(link).with_drain_policy(DrainPolicy {
        max_passes: args.max_drain_passes,
    })?;
    uart.configure(&config).context("Failed to configure UARTs")?;
    let uart = SharedUart::new(uart);

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        ctrlc::set_handler(move || running.store(false, Ordering::SeqCst))
            .context("Failed to install Ctrl-C handler")?;
    }

    match args.command {
        Command::Receive => run_receive(&uart, &running, interval),
        Command::Transmit => run_transmit(&uart, &running, interval),
        Command::Loopback => run_loopback(&uart, &running, interval),
        Command::Duplex => run_duplex(&uart, &running, interval),
    }
}

/// Sleep for `interval` unless asked to stop first.
fn pace(running: &AtomicBool, interval: Duration) -> bool {
    let step = Duration::from_millis(50);
    let mut left = interval;
    while running.load(Ordering::SeqCst) && !left.is_zero() {
        let nap = left.min(step);
        thread::sleep(nap);
        left -= nap;
    }
    running.load(Ordering::SeqCst)
}

/// Drain a channel, treating a drain timeout as a partial result.
fn drain_once(uart: &SharedUart<Link>, channel: ChannelId) -> Result<Vec<u8>> {
    match uart.drain(channel) {
        Ok(data) => Ok(data),
        Err(Error::DrainTimeout {
            drained, passes, ..
        }) => {
            warn!("{} kept producing for {} passes, continuing next round", channel, passes);
            Ok(drained)
        }
        Err(e) => Err(e).with_context(|| format!("Failed to drain {}", channel)),
    }
}

fn report(channel: ChannelId, data: &[u8]) {
    println!("{} RECEIVED ({} bytes): {:?}", channel, data.len(), data);
}

/// Poll `channel` on a background thread and print from this one.
fn spawn_receiver(
    uart: &SharedUart<Link>,
    running: &Arc<AtomicBool>,
    interval: Duration,
    channel: ChannelId,
) -> (mpsc::UnboundedReceiver<Vec<u8>>, thread::JoinHandle<Result<()>>) {
    let (tx, rx) = mpsc::unbounded();
    let uart = uart.clone();
    let running = Arc::clone(running);
    let handle = thread::spawn(move || -> Result<()> {
        while pace(&running, interval) {
            let data = drain_once(&uart, channel)?;
            if !data.is_empty() && tx.unbounded_send(data).is_err() {
                break;
            }
        }
        Ok(())
    });
    (rx, handle)
}

fn join(handle: thread::JoinHandle<Result<()>>) -> Result<()> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => bail!("worker thread panicked"),
    }
}

fn run_receive(uart: &SharedUart<Link>, running: &Arc<AtomicBool>, interval: Duration) -> Result<()> {
    let (mut rx, handle) = spawn_receiver(uart, running, interval, ChannelId::Uart0);
    future::block_on(async {
        while let Some(data) = rx.next().await {
            report(ChannelId::Uart0, &data);
        }
    });
    join(handle)
}

fn ramp() -> Vec<u8> {
    (0..=254).collect()
}

fn run_transmit(uart: &SharedUart<Link>, running: &AtomicBool, interval: Duration) -> Result<()> {
    let data = ramp();
    loop {
        uart.send(ChannelId::Uart1, &data)
            .context("Failed to send on UART1")?;
        info!("UART1 sent {} bytes", data.len());
        if !pace(running, interval) {
            return Ok(());
        }
    }
}

fn run_loopback(uart: &SharedUart<Link>, running: &AtomicBool, interval: Duration) -> Result<()> {
    let payloads: [Vec<u8>; 4] = [
        vec![0; 1030],
        vec![1; 1030],
        vec![2; 1030],
        (0..1030u32).map(|i| i as u8).collect(),
    ];
    let mut round = 0;

    while running.load(Ordering::SeqCst) {
        let payload = &payloads[round % payloads.len()];
        uart.send(ChannelId::Uart1, payload)
            .context("Failed to send on UART1")?;

        if !pace(running, interval) {
            break;
        }
        if uart.poll_new_data(ChannelId::Uart0)? {
            let data = drain_once(uart, ChannelId::Uart0)?;
            report(ChannelId::Uart0, &data);
            round += 1;
        }
    }
    Ok(())
}

fn run_duplex(uart: &SharedUart<Link>, running: &Arc<AtomicBool>, interval: Duration) -> Result<()> {
    let sender = {
        let uart = uart.clone();
        let running = Arc::clone(running);
        thread::spawn(move || run_transmit(&uart, &running, interval))
    };
    let (mut rx, receiver) = spawn_receiver(uart, running, interval, ChannelId::Uart0);

    future::block_on(async {
        while let Some(data) = rx.next().await {
            report(ChannelId::Uart0, &data);
        }
    });

    // Stop the transmitter too if the receiver gave up on its own
    running.store(false, Ordering::SeqCst);
    let received = join(receiver);
    join(sender)?;
    received
}
