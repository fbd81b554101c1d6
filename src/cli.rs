use std::{net::SocketAddr, path::PathBuf, str::FromStr};

use clap::{Arg, ArgAction, ArgMatches, ColorChoice, Command, value_parser};
use hifitime::prelude::Duration;

use crate::{
    link::MAX_PAYLOAD,
    rtk::settings::Settings as RtkSettings,
    settings::{LinkSettings, LogSettings},
};

/// Deployed role
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Role {
    /// Reference station: corrections onto the link
    Base,
    /// Rover: corrections into the receiver, RTK solving and publication
    Rover,
}

/// Receiver access
#[derive(Debug, Clone, PartialEq)]
pub enum Receiver {
    /// Serial port and baud rate
    Port(String, u32),
    /// Passive mode: files replayed in order
    Files(Vec<PathBuf>),
}

/// Seconds (`1.5`) or any [Duration] description (`250 ms`)
fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();

    if let Ok(seconds) = s.parse::<f64>() {
        return Ok(Duration::from_seconds(seconds));
    }

    Duration::from_str(s).map_err(|e| format!("invalid duration \"{}\": {}", s, e))
}

fn receiver_args(cmd: Command, port_env: &'static str, baud_env: &'static str) -> Command {
    cmd.next_help_heading("Receiver (serial port)")
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .value_name("PORT")
                .env(port_env)
                .required_unless_present("file")
                .help("Receiver serial port. Example /dev/ttyUSB0 on Linux"),
        )
        .arg(
            Arg::new("baudrate")
                .short('b')
                .long("baud")
                .value_name("BAUD")
                .env(baud_env)
                .value_parser(value_parser!(u32))
                .default_value("9600")
                .help("Receiver baud rate"),
        )
        .next_help_heading("File interface (Passive mode)")
        .arg(
            Arg::new("file")
                .short('f')
                .long("file")
                .value_name("FILENAME")
                .action(ArgAction::Append)
                .value_parser(value_parser!(PathBuf))
                .help(
                    "Replay a receiver capture instead of a live receiver. Use as many as needed,
they are consumed one after the other. Gzip files must be terminated with '.gz'",
                ),
        )
        .next_help_heading("Link")
        .arg(
            Arg::new("bind")
                .long("bind")
                .value_name("ADDR")
                .env("LINK_BIND")
                .value_parser(value_parser!(SocketAddr))
                .default_value("0.0.0.0:5600")
                .help("Local UDP address of the radio bridge link"),
        )
        .arg(
            Arg::new("peer")
                .long("peer")
                .value_name("ADDR")
                .env("LINK_PEER")
                .value_parser(value_parser!(SocketAddr))
                .default_value("127.0.0.1:5601")
                .help("UDP address of the radio bridge"),
        )
        .next_help_heading("Logs")
        .arg(
            Arg::new("prefix")
                .long("prefix")
                .value_name("DIR")
                .value_parser(value_parser!(PathBuf))
                .help("Directory where session logs are created. Default is current directory"),
        )
}

fn base_command() -> Command {
    receiver_args(
        Command::new("base").about("Relays the reference receiver corrections"),
        "BASE_GPS_PORT",
        "BASE_GPS_BAUD",
    )
    .next_help_heading("Packetizer")
    .arg(
        Arg::new("max-payload")
            .long("max-payload")
            .value_name("BYTES")
            .value_parser(value_parser!(u16).range(1..=MAX_PAYLOAD as i64))
            .default_value("200")
            .help("Largest payload per radio packet"),
    )
    .arg(
        Arg::new("flush")
            .long("flush")
            .value_name("DURATION")
            .value_parser(parse_duration)
            .default_value("250 ms")
            .help("Maximal latency before a partial packet is transmitted"),
    )
    .arg(
        Arg::new("beacon")
            .long("beacon")
            .value_name("DURATION")
            .value_parser(parse_duration)
            .default_value("5 s")
            .help("Liveness beacon period"),
    )
}

fn rover_command() -> Command {
    receiver_args(
        Command::new("rover").about("Injects corrections, solves and publishes the rover position"),
        "ROVER_GPS_PORT",
        "ROVER_GPS_BAUD",
    )
    .next_help_heading("Publication")
    .arg(
        Arg::new("host")
            .long("host")
            .value_name("HOST")
            .env("AGROPOST_HOST")
            .default_value("127.0.0.1")
            .help("Distribution service host"),
    )
    .arg(
        Arg::new("api-port")
            .long("api-port")
            .value_name("PORT")
            .env("AGROPOST_PORT")
            .value_parser(value_parser!(u16))
            .default_value("8000")
            .help("Distribution service port"),
    )
    .arg(
        Arg::new("post-interval")
            .long("post-interval")
            .value_name("DURATION")
            .env("AGROPOST_POST_INTERVAL")
            .value_parser(parse_duration)
            .default_value("1.0")
            .help("Minimal delay between two publications"),
    )
    .arg(
        Arg::new("min-fix")
            .long("min-fix")
            .value_name("QUALITY")
            .env("AGROPOST_MIN_FIX")
            .value_parser(value_parser!(u8))
            .default_value("4")
            .help("Minimal fix quality worth publishing, GGA code ranked fixed (4) > float (5) > single (1)"),
    )
    .next_help_heading("RTK engine")
    .arg(
        Arg::new("rtklib")
            .long("rtklib")
            .value_name("DIR")
            .env("RTKLIB_DIR")
            .value_parser(value_parser!(PathBuf))
            .default_value("../RTKLIB")
            .help("Directory holding the convbin and rnx2rtkp executables"),
    )
    .arg(
        Arg::new("rtk-tmp")
            .long("rtk-tmp")
            .value_name("DIR")
            .env("RTK_TMP_DIR")
            .value_parser(value_parser!(PathBuf))
            .default_value("./rtk_tmp")
            .help("Scratch directory, wiped on every run"),
    )
    .arg(
        Arg::new("rtk-conf")
            .long("rtk-conf")
            .value_name("FILE")
            .env("RTK_CONF_FILE")
            .value_parser(value_parser!(PathBuf))
            .help("RTKLIB processing options. Default is rtk_conf.conf in the RTKLIB directory"),
    )
    .arg(
        Arg::new("solve-interval")
            .long("solve-interval")
            .value_name("DURATION")
            .env("RTK_SOLVE_INTERVAL")
            .value_parser(parse_duration)
            .default_value("5 s")
            .help("Period between two post-processing runs"),
    )
    .arg(
        Arg::new("engine-timeout")
            .long("engine-timeout")
            .value_name("DURATION")
            .value_parser(parse_duration)
            .default_value("60 s")
            .help("Bound on each engine invocation"),
    )
    .arg(
        Arg::new("no-rtk")
            .long("no-rtk")
            .action(ArgAction::SetTrue)
            .help("Relay only: do not solve nor publish"),
    )
}

pub struct Cli {
    role: Role,
    /// Arguments passed by user, for the selected role
    matches: ArgMatches,
}

impl Cli {
    fn command() -> Command {
        Command::new("rtk-relay")
            .author("Carrasco, Hess")
            .version(env!("CARGO_PKG_VERSION"))
            .about("GNSS base to rover correction relay over packet radio")
            .color(ColorChoice::Always)
            .subcommand_required(true)
            .arg_required_else_help(true)
            .subcommand(base_command())
            .subcommand(rover_command())
    }

    /// Build new command line interface
    pub fn new() -> Self {
        Self::from_matches(Self::command().get_matches())
    }

    /// Parses given arguments
    #[cfg(test)]
    pub fn try_from_args<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Ok(Self::from_matches(Self::command().try_get_matches_from(args)?))
    }

    fn from_matches(matches: ArgMatches) -> Self {
        match matches.subcommand() {
            Some(("base", sub)) => Self {
                role: Role::Base,
                matches: sub.clone(),
            },
            Some((_, sub)) => Self {
                role: Role::Rover,
                matches: sub.clone(),
            },
            None => unreachable!("subcommand required"),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn receiver(&self) -> Receiver {
        if let Some(files) = self.matches.get_many::<PathBuf>("file") {
            Receiver::Files(files.cloned().collect())
        } else {
            let port = self
                .matches
                .get_one::<String>("port")
                .cloned()
                .unwrap_or_default();

            Receiver::Port(port, self.baud_rate())
        }
    }

    fn baud_rate(&self) -> u32 {
        *self.matches.get_one::<u32>("baudrate").unwrap_or(&9600)
    }

    pub fn bind(&self) -> SocketAddr {
        *self
            .matches
            .get_one::<SocketAddr>("bind")
            .unwrap_or(&SocketAddr::from(([0, 0, 0, 0], 5600)))
    }

    pub fn peer(&self) -> SocketAddr {
        *self
            .matches
            .get_one::<SocketAddr>("peer")
            .unwrap_or(&SocketAddr::from(([127, 0, 0, 1], 5601)))
    }

    fn duration(&self, id: &str) -> Option<Duration> {
        self.matches.get_one::<Duration>(id).copied()
    }

    pub fn log_settings(&self) -> LogSettings {
        LogSettings {
            prefix: self.matches.get_one::<PathBuf>("prefix").cloned(),
        }
    }

    pub fn link_settings(&self) -> LinkSettings {
        let default = LinkSettings::default();

        if self.role != Role::Base {
            return default;
        }

        LinkSettings {
            max_payload: self
                .matches
                .get_one::<u16>("max-payload")
                .map(|size| *size as usize)
                .unwrap_or(default.max_payload),
            flush_interval: self.duration("flush").unwrap_or(default.flush_interval),
            beacon_interval: self.duration("beacon").unwrap_or(default.beacon_interval),
        }
    }

    /// Distribution service (host, port)
    pub fn publish_endpoint(&self) -> (String, u16) {
        let host = self
            .matches
            .get_one::<String>("host")
            .cloned()
            .unwrap_or_else(|| "127.0.0.1".to_string());

        let port = *self.matches.get_one::<u16>("api-port").unwrap_or(&8000);

        (host, port)
    }

    /// RTK settings, None when disabled (or base role)
    pub fn rtk_settings(&self) -> Option<RtkSettings> {
        if self.role != Role::Rover || self.matches.get_flag("no-rtk") {
            return None;
        }

        let default = RtkSettings::default();

        let rtklib_dir = self
            .matches
            .get_one::<PathBuf>("rtklib")
            .cloned()
            .unwrap_or(default.rtklib_dir);

        let config_file = match self.matches.get_one::<PathBuf>("rtk-conf") {
            Some(conf) => conf.clone(),
            None => rtklib_dir.join("rtk_conf.conf"),
        };

        Some(RtkSettings {
            config_file,
            scratch_dir: self
                .matches
                .get_one::<PathBuf>("rtk-tmp")
                .cloned()
                .unwrap_or(default.scratch_dir),
            interval: self.duration("solve-interval").unwrap_or(default.interval),
            engine_timeout: self
                .duration("engine-timeout")
                .unwrap_or(default.engine_timeout),
            min_quality: *self
                .matches
                .get_one::<u8>("min-fix")
                .unwrap_or(&default.min_quality),
            min_publish_interval: self
                .duration("post-interval")
                .unwrap_or(default.min_publish_interval),
            rtklib_dir,
            ..default
        })
    }
}
