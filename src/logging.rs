//! Logging backend which logs to a file, and over UDP when built with the `debug` feature.

use std::{
    fs::File,
    io::Write,
    path::{Path, PathBuf},
    sync::{mpsc, Mutex},
};

use chrono::Local;
use eyre::{Context, Result};
use log::{Level, Metadata, Record};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
enum MessageType {
    Normal,
    Error,
    Warning,
    Debug,
}

#[derive(Debug, Serialize, Deserialize)]
struct Message {
    module: String,
    msg_type: MessageType,
    string: String,
    time: String,
}

impl Message {
    fn from_record(record: &Record) -> Message {
        let msg_type = match record.level() {
            Level::Error => MessageType::Error,
            Level::Warn => MessageType::Warning,
            Level::Info => MessageType::Normal,
            Level::Debug | Level::Trace => MessageType::Debug,
        };

        Message {
            module: record
                .module_path()
                .and_then(|path| path.split("::").last())
                .unwrap_or("unknown")
                .to_string(),
            msg_type,
            string: format!("{}", record.args()),
            time: Local::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
        }
    }

    /// Serializes the message with a little-endian length prefix that counts itself.
    #[cfg(any(feature = "debug", test))]
    fn pack(&self) -> Option<Vec<u8>> {
        use byteorder::{WriteBytesExt, LE};

        let serialized = bincode::serialize::<Message>(self).ok()?;

        let mut packed = Vec::with_capacity(serialized.len() + 4);
        packed
            .write_u32::<LE>(serialized.len() as u32 + 4)
            .ok()?;
        packed.extend(&serialized);

        Some(packed)
    }

    fn write_to(&self, out: &mut impl Write) -> std::io::Result<()> {
        let level_name = match self.msg_type {
            MessageType::Normal => "info",
            MessageType::Error => "error",
            MessageType::Warning => "warning",
            MessageType::Debug => "debug",
        };

        //      [date time] [module] [level] Text
        writeln!(
            out,
            "[{}] [{}] [{}] {}",
            self.time, self.module, level_name, self.string
        )
    }
}

pub struct Logger;

impl log::Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        if let Some(sender) = MSG_SENDER.get() {
            // If the receiving thread has gone there is nowhere to report the error to.
            let _ = sender
                .lock()
                .map(|sender| sender.send(Message::from_record(record)));
        }
    }

    fn flush(&self) {}
}

static LOGGER: Logger = Logger;

/// Mirrors messages over UDP in debug builds.
struct UdpMirror {
    #[cfg(feature = "debug")]
    socket: Option<std::net::UdpSocket>,
}

impl UdpMirror {
    fn new() -> UdpMirror {
        UdpMirror {
            #[cfg(feature = "debug")]
            socket: std::net::UdpSocket::bind("0.0.0.0:0").ok(),
        }
    }

    #[cfg(feature = "debug")]
    fn send(&self, msg: &Message) {
        if let (Some(socket), Some(bin)) = (&self.socket, msg.pack()) {
            let address = std::env::var("ATOMSWAP_LOG_ADDR")
                .unwrap_or_else(|_| "127.0.0.1:4568".to_string());

            let _ = socket.send_to(&bin, address);
        }
    }

    #[cfg(not(feature = "debug"))]
    fn send(&self, _: &Message) {}
}

static MSG_SENDER: OnceCell<Mutex<mpsc::Sender<Message>>> = OnceCell::new();

/// Where panic reports are written.
static PANIC_PATH: OnceCell<PathBuf> = OnceCell::new();

fn panic_hook(info: &std::panic::PanicInfo) {
    let message = info
        .payload()
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| info.payload().downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "no message".to_string());

    let location = info
        .location()
        .map(ToString::to_string)
        .unwrap_or_else(|| "unknown".to_string());

    let time = Local::now();
    let backtrace = std::backtrace::Backtrace::force_capture();

    let info_dump = format!(
        "The audio redirection plugin panicked.

Message: {message}
Location: {location}
Time: {time}
Backtrace: see below

{backtrace}"
    );

    log::error!("{info_dump}");

    if let Some(path) = PANIC_PATH.get() {
        let _ = std::fs::write(path, info_dump);
    }
}

/// Starts logging to the file at `path`. Messages are written on a background thread so that
/// logging never slows down the game's audio threads.
pub fn init(path: impl AsRef<Path>, level: log::LevelFilter) -> Result<()> {
    let path = path.as_ref();
    let mut file =
        File::create(path).wrap_err_with(|| format!("failed to create log file {path:?}"))?;

    if let Some(dir) = path.parent() {
        let _ = PANIC_PATH.set(dir.join("PANIC.txt"));
    }

    std::panic::set_hook(Box::new(panic_hook));

    let (sender, receiver) = mpsc::channel::<Message>();

    MSG_SENDER
        .set(Mutex::new(sender))
        .map_err(|_| eyre::eyre!("logging has already been initialised"))?;

    log::set_logger(&LOGGER)
        .map_err(|_| eyre::eyre!("another logger is already installed"))?;
    log::set_max_level(level);

    let mirror = UdpMirror::new();

    std::thread::spawn(move || {
        for msg in receiver {
            let _ = msg.write_to(&mut file);
            mirror.send(&msg);
        }
    });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> Message {
        Message {
            module: "volume".to_string(),
            msg_type: MessageType::Warning,
            string: "category 11 volume set to 0.35".to_string(),
            time: "2024-01-01 00:00:00.000".to_string(),
        }
    }

    #[test]
    fn lines_use_log_file_format() {
        let mut out = vec![];
        message().write_to(&mut out).unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "[2024-01-01 00:00:00.000] [volume] [warning] category 11 volume set to 0.35\n"
        );
    }

    #[test]
    fn packed_messages_are_length_prefixed() {
        let packed = message().pack().unwrap();
        let length = u32::from_le_bytes(packed[..4].try_into().unwrap());

        assert_eq!(length as usize, packed.len());

        let unpacked: Message = bincode::deserialize(&packed[4..]).unwrap();
        assert_eq!(unpacked.msg_type, MessageType::Warning);
        assert_eq!(unpacked.string, message().string);
    }

    #[test]
    fn module_name_is_last_path_segment() {
        let message = Message::from_record(
            &Record::builder()
                .args(format_args!("hello"))
                .level(Level::Debug)
                .module_path(Some("atomswap::audio::volume"))
                .build(),
        );

        assert_eq!(message.module, "volume");
        assert_eq!(message.msg_type, MessageType::Debug);
        assert_eq!(message.string, "hello");
    }

    struct OtherLogger;

    impl log::Log for OtherLogger {
        fn enabled(&self, _: &Metadata) -> bool {
            false
        }

        fn log(&self, _: &Record) {}

        fn flush(&self) {}
    }

    static OTHER_LOGGER: OtherLogger = OtherLogger;

    // The only test that touches the global logger.
    #[test]
    fn init_fails_if_another_logger_is_installed() {
        log::set_logger(&OTHER_LOGGER).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let err = init(dir.path().join("atomswap.log"), log::LevelFilter::Debug).unwrap_err();

        // Put the default panic hook back for the other tests.
        let _ = std::panic::take_hook();

        assert!(err.to_string().contains("another logger"));
    }
}
