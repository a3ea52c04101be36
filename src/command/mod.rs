pub mod server_cmd;
pub mod stock;

use crate::config::SharedConfig;
use crate::connection::{ClientState, SharedStats};
use crate::error::LedgerError;
use crate::ledger::SharedLedger;
use crate::logging::LogHandle;
use crate::resp::RespValue;

/// Everything a command handler may touch besides the calling client.
#[derive(Clone)]
pub struct Context {
    pub ledger: SharedLedger,
    pub config: SharedConfig,
    pub stats: SharedStats,
    /// Present when the process owns a reloadable log filter.
    pub log: Option<LogHandle>,
}

/// Names answered by COMMAND and accepted by dispatch.
pub const COMMANDS: &[&str] = &[
    "PING", "ECHO", "QUIT", "AUTH", "CLIENT", "DBSIZE", "INFO", "CONFIG", "COMMAND",
    "STOCK.INIT", "STOCK.MINIT", "STOCK.RESERVE", "STOCK.RESTOCK", "STOCK.PEEK",
    "STOCK.LOWSTOCK", "STOCK.REMOVE", "STOCK.KEYS",
];

/// Dispatch a parsed command to the appropriate handler.
pub async fn dispatch(
    cmd_name: &str,
    args: &[RespValue],
    ctx: &Context,
    client: &mut ClientState,
) -> RespValue {
    match cmd_name {
        // Connection
        "PING" => server_cmd::cmd_ping(args),
        "ECHO" => server_cmd::cmd_echo(args),
        "QUIT" => server_cmd::cmd_quit(client),
        "AUTH" => server_cmd::cmd_auth(args, client, &ctx.config).await,
        "CLIENT" => server_cmd::cmd_client(args, client),

        // Server
        "DBSIZE" => RespValue::unsigned(ctx.ledger.len() as u64),
        "INFO" => server_cmd::cmd_info(args, ctx).await,
        "CONFIG" => server_cmd::cmd_config(args, ctx).await,
        "COMMAND" => server_cmd::cmd_command(args),

        // Ledger
        "STOCK.INIT" => stock::cmd_init(args, &ctx.ledger),
        "STOCK.MINIT" => stock::cmd_minit(args, &ctx.ledger),
        "STOCK.RESERVE" => stock::cmd_reserve(args, &ctx.ledger),
        "STOCK.RESTOCK" => stock::cmd_restock(args, &ctx.ledger),
        "STOCK.PEEK" => stock::cmd_peek(args, &ctx.ledger),
        "STOCK.LOWSTOCK" => stock::cmd_lowstock(args, &ctx.ledger, &ctx.config).await,
        "STOCK.REMOVE" => stock::cmd_remove(args, &ctx.ledger),
        "STOCK.KEYS" => stock::cmd_keys(args, &ctx.ledger),

        _ => {
            let args_preview: Vec<String> = args
                .iter()
                .take(3)
                .filter_map(|a| a.to_string_lossy())
                .map(|s| format!("'{s}'"))
                .collect();
            RespValue::error(format!(
                "ERR unknown command '{}', with args beginning with: {}",
                cmd_name.to_lowercase(),
                args_preview.join(" ")
            ))
        }
    }
}

/// Extract a UTF-8 string from a RespValue argument.
pub fn arg_to_string(arg: &RespValue) -> Option<String> {
    arg.to_string_lossy()
}

/// Extract an i64 from a RespValue argument.
pub fn arg_to_i64(arg: &RespValue) -> Option<i64> {
    arg.to_string_lossy()?.parse().ok()
}

pub fn not_integer() -> RespValue {
    RespValue::error("ERR value is not an integer or out of range")
}

/// Return a wrong number of arguments error.
pub fn wrong_arg_count(cmd: &str) -> RespValue {
    RespValue::error(format!("ERR wrong number of arguments for '{cmd}' command"))
}

impl From<LedgerError> for RespValue {
    fn from(e: LedgerError) -> Self {
        RespValue::error(e.to_resp_error())
    }
}
