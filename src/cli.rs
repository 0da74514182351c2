//! Command-line surface, derived with `argh` the way the crate's
//! previously-unused `argh` dependency implies it would have been wired up:
//! one subcommand struct per verb, dispatched from `main`.

use argh::FromArgs;

#[derive(FromArgs, PartialEq, Debug)]
/// HF contactless authentication and secure-messaging tool.
pub struct TopLevel {
    #[argh(subcommand)]
    pub command: Command,

    /// reader transport to use; only "proxmark3" exists today
    #[argh(option, default = "String::from(\"proxmark3\")")]
    pub transport: String,

    /// leave the RF field energized after the command completes
    #[argh(switch)]
    pub keep_field: bool,

    /// log every APDU exchanged, to stderr
    #[argh(switch)]
    pub verbose: bool,
}

#[derive(FromArgs, PartialEq, Debug)]
#[argh(subcommand)]
pub enum Command {
    Info(InfoArgs),
    Select(SelectArgs),
    Auth(AuthArgs),
    Read(ReadArgs),
    Write(WriteArgs),
    ManageKeys(ManageKeysArgs),
    Decrypt(DecryptArgs),
}

/// Selects a family's AID and reports its identity.
#[derive(FromArgs, PartialEq, Debug)]
#[argh(subcommand, name = "info")]
pub struct InfoArgs {
    /// protocol family: mifare-desfire, hid-seos, apple-hid-vas, fido-u2f, icao-emrtd-bac, cipurse
    #[argh(option)]
    pub family: String,
}

/// Selects an AID, optionally followed by a file under it.
#[derive(FromArgs, PartialEq, Debug)]
#[argh(subcommand, name = "select")]
pub struct SelectArgs {
    #[argh(option)]
    pub family: String,

    /// elementary file identifier, hex (e.g. 0101)
    #[argh(option)]
    pub fid: Option<String>,

    /// ADF object identifier, hex (SEOS only)
    #[argh(option)]
    pub aid: Option<String>,
}

/// Runs the family's mutual-authentication handshake and installs a session.
#[derive(FromArgs, PartialEq, Debug)]
#[argh(subcommand, name = "auth")]
pub struct AuthArgs {
    #[argh(option)]
    pub family: String,

    /// key slot index (0-3)
    #[argh(option, default = "0")]
    pub ki: usize,

    /// MRZ string (eMRTD BAC only)
    #[argh(option)]
    pub mrz: Option<String>,

    /// ADF object identifier, hex (SEOS only)
    #[argh(option)]
    pub oid: Option<String>,

    /// request-direction security level: plain, mac, encrypted (CIPURSE only)
    #[argh(option, default = "String::from(\"encrypted\")")]
    pub sreq: String,

    /// response-direction security level: plain, mac, encrypted (CIPURSE only)
    #[argh(option, default = "String::from(\"encrypted\")")]
    pub sresp: String,
}

/// Reads a binary elementary file through the active session.
#[derive(FromArgs, PartialEq, Debug)]
#[argh(subcommand, name = "read")]
pub struct ReadArgs {
    /// elementary file identifier, hex
    #[argh(option)]
    pub fid: Option<String>,

    /// byte offset into the file
    #[argh(option, default = "0")]
    pub offset: u16,
}

/// Writes a binary elementary file through the active session.
#[derive(FromArgs, PartialEq, Debug)]
#[argh(subcommand, name = "write")]
pub struct WriteArgs {
    /// elementary file identifier, hex
    #[argh(option)]
    pub fid: Option<String>,

    /// byte offset into the file
    #[argh(option, default = "0")]
    pub offset: u16,

    /// data to write, hex
    #[argh(option)]
    pub data: String,
}

/// Loads, saves, or prints the on-disk key store.
#[derive(FromArgs, PartialEq, Debug)]
#[argh(subcommand, name = "managekeys")]
pub struct ManageKeysArgs {
    /// path to load a 4x88-byte keyring file from
    #[argh(option)]
    pub load: Option<String>,

    /// path to save the current keyring to
    #[argh(option)]
    pub save: Option<String>,

    /// print the loaded keyring
    #[argh(switch)]
    pub print: bool,

    /// print full key material, not just nonces
    #[argh(switch)]
    pub full: bool,
}

/// Decrypts a captured Apple/HID VAS cryptogram offline.
#[derive(FromArgs, PartialEq, Debug)]
#[argh(subcommand, name = "decrypt")]
pub struct DecryptArgs {
    /// ASCII Pass Type ID the cryptogram was addressed to
    #[argh(option)]
    pub pid: String,

    /// path to the reader's EC private key, SEC1 DER
    #[argh(option, short = 'f')]
    pub keyfile: String,

    /// captured cryptogram bytes, hex
    #[argh(option, short = 'd')]
    pub data: String,
}
