//! CLI entry point: parses argv into a [`cli::TopLevel`], builds an
//! [`orchestrator::Context`] over the selected transport, and dispatches the
//! requested verb (spec §6). Everything below this file is the library
//! crate `picc_secure_auth`; this binary is a thin wrapper over it.

mod cli;

use cli::{AuthArgs, Command, DecryptArgs, InfoArgs, ManageKeysArgs, ReadArgs, SelectArgs, TopLevel, WriteArgs};
use picc_secure_auth::error::Error;
use picc_secure_auth::families::Family;
use picc_secure_auth::keystore::KeyField;
use picc_secure_auth::orchestrator::{AuthRequest, Context, KeyStoreOp};
use picc_secure_auth::session::SecurityLevel;
use picc_secure_auth::transport::Transport;
use std::process::ExitCode;
use std::str::FromStr;

fn main() -> ExitCode {
    let args: TopLevel = argh::from_env();

    let filter = if args.verbose { "picc_secure_auth=trace" } else { "picc_secure_auth=info" };
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::new(filter)).with_target(false).init();

    match run(args) {
        Ok(output) => {
            if let Some(output) = output {
                println!("{output}");
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!("{err}");
            ExitCode::from(err.exit_code() as u8)
        }
    }
}

fn run(args: TopLevel) -> Result<Option<String>, Error> {
    let transport = open_transport(&args.transport)?;
    let mut ctx = Context::new(transport);
    let keep_field = args.keep_field;
    ctx.log_apdus = args.verbose;

    match args.command {
        Command::Info(info) => run_info(&mut ctx, info, keep_field).map(Some),
        Command::Select(select) => run_select(&mut ctx, select, keep_field).map(|_| None),
        Command::Auth(auth) => run_auth(&mut ctx, auth, keep_field).map(|_| None),
        Command::Read(read) => run_read(&mut ctx, read, keep_field).map(Some),
        Command::Write(write) => run_write(&mut ctx, write, keep_field).map(|_| None),
        Command::ManageKeys(manage_keys) => run_manage_keys(&mut ctx, manage_keys),
        Command::Decrypt(decrypt) => run_decrypt(&ctx, decrypt).map(Some),
    }
}

fn open_transport(name: &str) -> Result<Box<dyn Transport>, Error> {
    match name {
        #[cfg(feature = "proxmark3")]
        "proxmark3" => Ok(Box::new(picc_secure_auth::transport::proxmark3::Proxmark3Transport::open()?)),
        #[cfg(not(feature = "proxmark3"))]
        "proxmark3" => Err(Error::InvalidArgument("built without the proxmark3 feature".into())),
        other => Err(Error::InvalidArgument(format!("unknown transport {other:?}"))),
    }
}

fn run_info(ctx: &mut Context, args: InfoArgs, keep_field: bool) -> Result<String, Error> {
    let family = Family::from_str(&args.family)?;
    ctx.info(family, keep_field)
}

fn run_select(ctx: &mut Context, args: SelectArgs, keep_field: bool) -> Result<(), Error> {
    let family = Family::from_str(&args.family)?;
    if let Some(oid_hex) = args.aid {
        let oid = parse_hex(&oid_hex)?;
        ctx.select(family, None, true)?;
        let adf_response = picc_secure_auth::select::select_seos_oid(&mut *ctx.transport, &oid)?;
        let (_, _, _) = picc_secure_auth::cryptogram::parse_adf_response(&adf_response)?;
        if !keep_field {
            ctx.transport.drop_field()?;
        }
        return Ok(());
    }
    let fid = args.fid.map(|s| parse_hex_u16(&s)).transpose()?;
    ctx.select(family, fid, keep_field)?;
    Ok(())
}

fn run_auth(ctx: &mut Context, args: AuthArgs, keep_field: bool) -> Result<(), Error> {
    let family = Family::from_str(&args.family)?;
    let request = match family {
        Family::Emrtd => {
            let mrz = args.mrz.ok_or_else(|| Error::InvalidArgument("eMRTD BAC auth needs --mrz".into()))?;
            AuthRequest::Emrtd { mrz }
        }
        Family::Desfire => AuthRequest::Desfire { ki: args.ki },
        Family::Cipurse => {
            let req_level = parse_security_level(&args.sreq)?;
            let resp_level = parse_security_level(&args.sresp)?;
            AuthRequest::Cipurse { ki: args.ki, req_level, resp_level }
        }
        Family::Seos => {
            let oid_hex = args.oid.ok_or_else(|| Error::InvalidArgument("SEOS auth needs --oid".into()))?;
            AuthRequest::Seos { ki: args.ki, oid: parse_hex(&oid_hex)? }
        }
        Family::Vas | Family::Fido => AuthRequest::NoMutualAuth { family },
    };
    ctx.auth(request, keep_field)
}

fn run_read(ctx: &mut Context, args: ReadArgs, keep_field: bool) -> Result<String, Error> {
    let fid = args.fid.map(|s| parse_hex_u16(&s)).transpose()?;
    let data = ctx.read(fid, args.offset, keep_field)?;
    Ok(hex::encode(data))
}

fn run_write(ctx: &mut Context, args: WriteArgs, keep_field: bool) -> Result<(), Error> {
    let fid = args.fid.map(|s| parse_hex_u16(&s)).transpose()?;
    let data = parse_hex(&args.data)?;
    ctx.write(fid, args.offset, &data, keep_field)
}

fn run_manage_keys(ctx: &mut Context, args: ManageKeysArgs) -> Result<Option<String>, Error> {
    if let Some(path) = args.load {
        ctx.manage_keys(KeyStoreOp::Load { path })?;
    }
    if let Some(path) = args.save {
        ctx.manage_keys(KeyStoreOp::Save { path })?;
    }
    if args.print {
        return ctx.manage_keys(KeyStoreOp::Print { verbose: args.full });
    }
    Ok(None)
}

fn run_decrypt(ctx: &Context, args: DecryptArgs) -> Result<String, Error> {
    let privkey_der = std::fs::read(&args.keyfile).map_err(|e| Error::InvalidArgument(format!("cannot read key file: {e}")))?;
    let payload = ctx.decrypt_vas(&privkey_der, &args.pid, &args.data)?;
    Ok(format!("timestamp: {}\npayload: {}", payload.timestamp, hex::encode(payload.payload)))
}

/// The keystore's [`KeyField::set`] variants aren't exposed on the CLI today
/// (spec §6 lists `managekeys` only with load/save/print); kept here so the
/// orchestrator's `KeyStoreOp::Set` arm has at least one non-test caller
/// path documented for future CLI growth.
#[allow(dead_code)]
fn set_key_field(ctx: &mut Context, slot: usize, field: KeyField, hex_value: &str) -> Result<(), Error> {
    let bytes = parse_hex(hex_value)?;
    ctx.manage_keys(KeyStoreOp::Set { slot, field, bytes })?;
    Ok(())
}

fn parse_hex(s: &str) -> Result<Vec<u8>, Error> {
    hex::decode(s).map_err(|e| Error::InvalidArgument(format!("malformed hex {s:?}: {e}")))
}

fn parse_hex_u16(s: &str) -> Result<u16, Error> {
    u16::from_str_radix(s, 16).map_err(|e| Error::InvalidArgument(format!("malformed hex identifier {s:?}: {e}")))
}

fn parse_security_level(s: &str) -> Result<SecurityLevel, Error> {
    match s {
        "plain" => Ok(SecurityLevel::Plain),
        "mac" => Ok(SecurityLevel::Mac),
        "encrypted" => Ok(SecurityLevel::Encrypted),
        other => Err(Error::InvalidArgument(format!("unknown security level {other:?}"))),
    }
}
