//! Drive a trustlet module from an untrusted host.
//!
//! The host plays both sides of the protocol: it starts a [Module] with a module key issued by a
//! (local) attestation authority, then acts as a remote peer that provisions connections, sends
//! authenticated commands to an LED on channel 1, and verifies an attestation proof. Every call
//! into the module goes through its numeric command surface and the resulting status code is
//! logged.
//!
//! # Usage
//!
//! ```sh
//! cargo run --release --bin trustlet-host -- \
//!     --module-key 000102030405060708090a0b0c0d0e0f \
//!     --connection 7:1:aes-128-gcm --connection 8:1:ascon-128 \
//!     --commands 3 --challenge 6e6f6e6365
//! ```

use bytes::Bytes;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use rand::{rngs::OsRng, Rng};
use std::{cell::Cell, process::ExitCode, rc::Rc, str::FromStr, time::Duration};
use thiserror::Error;
use tracing::{error, info, warn, Level};
use trustlet::{
    command::{self, status, Param, Params, Response},
    peer::{verify_proof, Peer},
    Config, Module,
};
use trustlet_cryptography::{CipherKind, Software, KEY_LENGTH};
use zeroize::Zeroizing;

mod authority;

/// Channel driving the LED.
const LED_CHANNEL: u16 = 1;

/// Errors that can stop the host.
#[derive(Error, Debug)]
enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("module: {0}")]
    Module(#[from] trustlet::Error),
}

/// A connection to provision, given as `<connection id>:<channel id>:<cipher>`.
#[derive(Clone, Copy, Debug)]
struct ConnectionArg {
    connection_id: u16,
    channel_id: u16,
    cipher: CipherKind,
}

impl FromStr for ConnectionArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = s.split(':').collect::<Vec<_>>();
        let [connection_id, channel_id, cipher] = parts[..] else {
            return Err("expected <connection id>:<channel id>:<cipher>".into());
        };
        let connection_id = connection_id
            .parse::<u16>()
            .map_err(|_| format!("connection id not well-formed: {connection_id}"))?;
        let channel_id = channel_id
            .parse::<u16>()
            .map_err(|_| format!("channel id not well-formed: {channel_id}"))?;
        let cipher = [CipherKind::Aes128Gcm, CipherKind::Ascon128]
            .into_iter()
            .find(|kind| kind.to_string() == cipher)
            .ok_or_else(|| format!("unknown cipher: {cipher}"))?;
        Ok(Self {
            connection_id,
            channel_id,
            cipher,
        })
    }
}

/// Simulated LED toggled by authenticated commands.
#[derive(Clone, Default)]
struct Led {
    on: Rc<Cell<bool>>,
}

impl Led {
    fn toggle(&self, connection_id: u16, data: &[u8]) {
        let on = !self.on.get();
        self.on.set(on);
        info!(connection_id, len = data.len(), on, "led toggled");
    }
}

/// Invoke `command` and log its status code.
fn invoke(
    module: &mut Module<Software>,
    command: command::Command,
    params: Params,
) -> Result<Response, trustlet::Error> {
    let result = module.invoke(command as u32, params);
    let code = match &result {
        Ok(_) => status::SUCCESS,
        Err(err) => err.status(),
    };
    info!(?command, status = %format!("{code:#010x}"), "invoked");
    result
}

fn run(
    module_key: Zeroizing<Vec<u8>>,
    mut authority: authority::Bounded<authority::Static>,
    connections: Vec<ConnectionArg>,
    commands: usize,
    challenge: Vec<u8>,
) -> Result<(), Error> {
    // Start the module
    let mut module = Module::new(Software, Config::recommended());
    module.start(&mut authority)?;
    let led = Led::default();
    let actuator = led.clone();
    module.register(LED_CHANNEL, move |connection_id: u16, data: &[u8]| {
        actuator.toggle(connection_id, data)
    });

    // Provision every connection with a fresh session key
    let mut peers = Vec::with_capacity(connections.len());
    for connection in connections {
        let key: [u8; KEY_LENGTH] = OsRng.gen();
        let peer = Peer::new(
            connection.connection_id,
            connection.channel_id,
            connection.cipher,
            key,
        );
        let wrapped = peer.wrap(&Software, module.config(), &module_key)?;
        let params = [
            Param::Input(wrapped.header),
            Param::Input(wrapped.ciphertext),
            Param::Input(wrapped.tag),
            Param::None,
        ];
        match invoke(&mut module, command::Command::SetKey, params) {
            Ok(_) => peers.push(peer),
            Err(err) => warn!(
                connection_id = connection.connection_id,
                ?err,
                "provisioning failed"
            ),
        }
    }

    // Send commands, then replay the last one
    for peer in peers.iter_mut() {
        let connection_id = peer.metadata().connection_id;
        let mut last = None;
        for _ in 0..commands {
            let (ciphertext, tag) = peer.seal(&Software, b"toggle")?;
            let params = [
                Param::Value(connection_id as u32, 0),
                Param::Input(ciphertext.into()),
                Param::Input(Bytes::copy_from_slice(&tag)),
                Param::None,
            ];
            last = Some(params.clone());
            if let Err(err) = invoke(&mut module, command::Command::HandleInput, params) {
                warn!(connection_id, ?err, "command rejected");
            }
        }
        if let Some(params) = last {
            match invoke(&mut module, command::Command::HandleInput, params) {
                Ok(_) => error!(connection_id, "replayed command was accepted"),
                Err(err) => info!(connection_id, ?err, "replayed command rejected"),
            }
        }
    }
    info!(on = led.on.get(), "led state");

    // Attest and verify the proof as a remote verifier would
    let params = [
        Param::Input(Bytes::from(challenge.clone())),
        Param::Output(trustlet_cryptography::TAG_LENGTH),
        Param::None,
        Param::None,
    ];
    if let Response::Output(tag) = invoke(&mut module, command::Command::Attest, params)? {
        verify_proof(&Software, module.config(), &module_key, &challenge, &tag)?;
        info!(proof = hex::encode(&tag), "attestation verified");
    }

    // Reserved entry point
    invoke(&mut module, command::Command::Entry, Default::default())?;
    Ok(())
}

/// Read the configuration from `matches` and run the host.
fn load(matches: &ArgMatches) -> Result<(), Error> {
    let module_key = matches
        .get_one::<String>("module-key")
        .ok_or_else(|| Error::InvalidArgument("missing module key".into()))?;
    let module_key = Zeroizing::new(hex::decode(module_key)?);
    if module_key.len() != KEY_LENGTH {
        return Err(Error::InvalidArgument(format!(
            "module key must be {KEY_LENGTH} bytes"
        )));
    }
    let challenge = match matches.get_one::<String>("challenge") {
        Some(challenge) => hex::decode(challenge)?,
        None => Vec::new(),
    };
    let connections = matches
        .get_many::<ConnectionArg>("connection")
        .map(|values| values.copied().collect())
        .unwrap_or_default();
    let commands = matches.get_one::<usize>("commands").copied().unwrap_or(0);
    let delay = matches
        .get_one::<u64>("authority-delay")
        .copied()
        .unwrap_or(0);
    let timeout = matches
        .get_one::<u64>("authority-timeout")
        .copied()
        .unwrap_or(0);
    let authority = authority::Bounded::new(
        authority::Static::new(module_key.clone(), Duration::from_millis(delay)),
        Duration::from_millis(timeout),
    );
    run(module_key, authority, connections, commands, challenge)
}

fn main() -> ExitCode {
    // Parse arguments
    let matches = Command::new("trustlet-host")
        .about("drive a trustlet module through its command surface")
        .arg(
            Arg::new("module-key")
                .long("module-key")
                .required(true)
                .help("Module key issued by the attestation authority (hex)"),
        )
        .arg(
            Arg::new("connection")
                .long("connection")
                .action(ArgAction::Append)
                .default_value("7:1:aes-128-gcm")
                .help("Connection to provision as <connection id>:<channel id>:<cipher>")
                .value_parser(value_parser!(ConnectionArg)),
        )
        .arg(
            Arg::new("commands")
                .long("commands")
                .default_value("3")
                .help("Commands to send per connection")
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("challenge")
                .long("challenge")
                .default_value("6368616c6c656e6765")
                .help("Attestation challenge (hex)"),
        )
        .arg(
            Arg::new("authority-delay")
                .long("authority-delay")
                .default_value("0")
                .help("Milliseconds the authority takes to answer")
                .value_parser(value_parser!(u64)),
        )
        .arg(
            Arg::new("authority-timeout")
                .long("authority-timeout")
                .default_value("5000")
                .help("Milliseconds to wait for the authority before giving up")
                .value_parser(value_parser!(u64)),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON"),
        )
        .get_matches();

    // Create logger
    let level = if matches.get_flag("verbose") {
        Level::DEBUG
    } else {
        Level::INFO
    };
    if matches.get_flag("json") {
        tracing_subscriber::fmt()
            .json()
            .with_max_level(level)
            .with_line_number(true)
            .with_file(true)
            .init();
    } else {
        tracing_subscriber::fmt().with_max_level(level).init();
    }

    match load(&matches) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = ?err, "host failed");
            ExitCode::FAILURE
        }
    }
}
