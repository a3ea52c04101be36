use crate::command::{COMMANDS, Context, arg_to_string, wrong_arg_count};
use crate::config::{PARAMETERS, SharedConfig};
use crate::connection::ClientState;
use crate::glob::glob_match;
use crate::resp::RespValue;
use std::fmt::Write;
use std::sync::atomic::Ordering;

pub fn cmd_ping(args: &[RespValue]) -> RespValue {
    match args {
        [] => RespValue::simple_string("PONG"),
        [msg] => match msg.as_str() {
            Some(msg) => RespValue::bulk_string(msg.to_vec()),
            None => RespValue::simple_string("PONG"),
        },
        _ => wrong_arg_count("ping"),
    }
}

pub fn cmd_echo(args: &[RespValue]) -> RespValue {
    if args.len() != 1 {
        return wrong_arg_count("echo");
    }
    match args[0].as_str() {
        Some(msg) => RespValue::bulk_string(msg.to_vec()),
        None => RespValue::null_bulk_string(),
    }
}

pub fn cmd_quit(client: &mut ClientState) -> RespValue {
    client.should_close = true;
    RespValue::ok()
}

pub async fn cmd_auth(
    args: &[RespValue],
    client: &mut ClientState,
    config: &SharedConfig,
) -> RespValue {
    if args.len() != 1 {
        return wrong_arg_count("auth");
    }

    let password = match arg_to_string(&args[0]) {
        Some(p) => p,
        None => return RespValue::error("ERR invalid password"),
    };

    let cfg = config.read().await;
    match &cfg.requirepass {
        Some(pass) if pass == &password => {
            client.authenticated = true;
            RespValue::ok()
        }
        Some(_) => {
            tracing::warn!(client = client.id, "rejected AUTH attempt");
            RespValue::error("WRONGPASS invalid password")
        }
        None => RespValue::error("ERR Client sent AUTH, but no password is set"),
    }
}

pub fn cmd_client(args: &[RespValue], client: &mut ClientState) -> RespValue {
    let subcmd = match args.first().and_then(arg_to_string) {
        Some(s) => s.to_uppercase(),
        None => return wrong_arg_count("client"),
    };
    match subcmd.as_str() {
        "ID" => RespValue::unsigned(client.id),
        "GETNAME" => match &client.name {
            Some(name) => RespValue::bulk_string(name.as_bytes().to_vec()),
            None => RespValue::null_bulk_string(),
        },
        "SETNAME" => match args.get(1).and_then(arg_to_string) {
            Some(name) if args.len() == 2 => {
                client.name = Some(name);
                RespValue::ok()
            }
            _ => wrong_arg_count("client|setname"),
        },
        // Library metadata sent by clients on connect is accepted and dropped.
        "SETINFO" => RespValue::ok(),
        _ => RespValue::error(format!(
            "ERR unknown subcommand '{}'. Try CLIENT ID, GETNAME or SETNAME.",
            subcmd.to_lowercase()
        )),
    }
}

pub async fn cmd_info(args: &[RespValue], ctx: &Context) -> RespValue {
    let section = args
        .first()
        .and_then(|a| a.to_string_lossy())
        .map(|s| s.to_lowercase());
    let show = |name: &str| match section.as_deref() {
        None | Some("all") | Some("default") | Some("everything") => true,
        Some(s) => s == name,
    };

    let cfg = ctx.config.read().await;
    let stats = ctx.ledger.stats();
    let mut info = String::new();

    // Writing to a String cannot fail.
    if show("server") {
        let _ = write!(
            info,
            "# Server\r\nstockd_version:{}\r\ntcp_port:{}\r\nshards:{}\r\n\r\n",
            env!("CARGO_PKG_VERSION"),
            cfg.port,
            ctx.ledger.shard_count(),
        );
    }
    if show("clients") {
        let _ = write!(
            info,
            "# Clients\r\nconnected_clients:{}\r\n\r\n",
            ctx.stats.connected_clients.load(Ordering::Relaxed)
        );
    }
    if show("stats") {
        let _ = write!(
            info,
            "# Stats\r\ntotal_connections_received:{}\r\ntotal_commands_processed:{}\r\n\
             reservations_granted:{}\r\nreservations_rejected:{}\r\nunits_reserved:{}\r\n\
             restocks:{}\r\n\r\n",
            ctx.stats.total_connections.load(Ordering::Relaxed),
            ctx.stats.total_commands.load(Ordering::Relaxed),
            stats.reservations_granted,
            stats.reservations_rejected,
            stats.units_reserved,
            stats.restocks,
        );
    }
    if show("keyspace") {
        let _ = write!(
            info,
            "# Keyspace\r\nkeys:{}\r\nlow_stock_threshold:{}\r\nlow_stock_keys:{}\r\n\r\n",
            ctx.ledger.len(),
            cfg.low_stock_threshold,
            ctx.ledger.low_stock(cfg.low_stock_threshold).len(),
        );
    }

    RespValue::bulk_string(info.into_bytes())
}

pub async fn cmd_config(args: &[RespValue], ctx: &Context) -> RespValue {
    let config = &ctx.config;
    let subcmd = match args.first().and_then(arg_to_string) {
        Some(s) => s.to_uppercase(),
        None => return wrong_arg_count("config"),
    };

    match subcmd.as_str() {
        "GET" => {
            if args.len() != 2 {
                return wrong_arg_count("config|get");
            }
            let pattern = match arg_to_string(&args[1]) {
                Some(s) => s.to_lowercase(),
                None => return RespValue::error("ERR invalid parameter"),
            };

            let cfg = config.read().await;
            let mut result = Vec::new();
            for param in PARAMETERS.iter().filter(|p| glob_match(&pattern, p)) {
                if let Some(val) = cfg.get(param) {
                    result.push(RespValue::bulk_string(param.as_bytes().to_vec()));
                    result.push(RespValue::bulk_string(val.into_bytes()));
                }
            }
            RespValue::array(result)
        }
        "SET" => {
            if args.len() != 3 {
                return wrong_arg_count("config|set");
            }
            let (Some(param), Some(value)) = (arg_to_string(&args[1]), arg_to_string(&args[2]))
            else {
                return RespValue::error("ERR invalid parameter");
            };

            let mut cfg = config.write().await;
            if let Err(e) = cfg.set(&param, &value) {
                return RespValue::error(format!("ERR {e}"));
            }
            if param.eq_ignore_ascii_case("loglevel") {
                if let Some(log) = &ctx.log {
                    if let Err(e) = log.set(&cfg.loglevel) {
                        return RespValue::error(format!("ERR {e}"));
                    }
                }
            }
            RespValue::ok()
        }
        _ => RespValue::error(format!(
            "ERR unknown subcommand '{}'. Try CONFIG GET or CONFIG SET.",
            subcmd.to_lowercase()
        )),
    }
}

pub fn cmd_command(args: &[RespValue]) -> RespValue {
    let subcmd = args
        .first()
        .and_then(arg_to_string)
        .map(|s| s.to_uppercase());

    match subcmd.as_deref() {
        None => RespValue::array(
            COMMANDS
                .iter()
                .map(|name| RespValue::bulk_string(name.to_lowercase().into_bytes()))
                .collect(),
        ),
        Some("COUNT") => RespValue::integer(COMMANDS.len() as i64),
        // redis-cli asks for docs on connect; there are none to give.
        Some("DOCS") => RespValue::array(vec![]),
        Some(other) => RespValue::error(format!(
            "ERR unknown subcommand '{}'. Try COMMAND COUNT.",
            other.to_lowercase()
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::connection::ServerStats;
    use crate::ledger::Ledger;
    use crate::logging::LogHandle;
    use std::sync::Arc;
    use tokio::sync::RwLock;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::{EnvFilter, Registry, reload};

    fn ctx() -> Context {
        Context {
            ledger: Arc::new(Ledger::new()),
            config: Arc::new(RwLock::new(Config::default())),
            stats: Arc::new(ServerStats::default()),
            log: None,
        }
    }

    fn info_text(reply: RespValue) -> String {
        match reply {
            RespValue::BulkString(Some(b)) => String::from_utf8(b).unwrap(),
            other => panic!("unexpected reply {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_info_reports_ledger_stats() {
        let ctx = ctx();
        ctx.ledger.initialize("PROD_1", 3).unwrap();
        ctx.ledger.reserve("PROD_1", 2).unwrap();
        ctx.ledger.reserve("PROD_1", 2).unwrap();

        let text = info_text(cmd_info(&[], &ctx).await);
        assert!(text.contains("reservations_granted:1\r\n"));
        assert!(text.contains("reservations_rejected:1\r\n"));
        assert!(text.contains("keys:1\r\n"));
        assert!(text.contains("low_stock_keys:1\r\n"));

        let text = info_text(cmd_info(&[RespValue::bulk_string("keyspace")], &ctx).await);
        assert!(!text.contains("# Stats"));
    }

    #[tokio::test]
    async fn test_config_get_set() {
        let ctx = ctx();
        let reply = cmd_config(
            &[
                RespValue::bulk_string("SET"),
                RespValue::bulk_string("low-stock-threshold"),
                RespValue::bulk_string("7"),
            ],
            &ctx,
        )
        .await;
        assert_eq!(reply, RespValue::ok());

        let reply = cmd_config(
            &[RespValue::bulk_string("get"), RespValue::bulk_string("low-*")],
            &ctx,
        )
        .await;
        assert_eq!(
            reply,
            RespValue::array(vec![
                RespValue::bulk_string("low-stock-threshold"),
                RespValue::bulk_string("7"),
            ])
        );
    }

    #[tokio::test]
    async fn test_config_set_loglevel_reloads_filter() {
        let (layer, handle) = reload::Layer::<EnvFilter, Registry>::new(EnvFilter::new("info"));
        let _subscriber = Registry::default().with(layer);
        let log = LogHandle::new(handle);
        let ctx = Context {
            log: Some(log.clone()),
            ..ctx()
        };

        let set = |level: &str| {
            [
                RespValue::bulk_string("SET"),
                RespValue::bulk_string("loglevel"),
                RespValue::bulk_string(level.to_string()),
            ]
        };
        assert_eq!(cmd_config(&set("stockd=trace"), &ctx).await, RespValue::ok());
        assert_eq!(log.current().as_deref(), Some("stockd=trace"));
        assert_eq!(ctx.config.read().await.loglevel, "stockd=trace");

        let reply = cmd_config(&set("stockd=loud"), &ctx).await;
        assert!(matches!(reply, RespValue::Error(msg) if msg.starts_with("ERR Invalid loglevel")));
        assert_eq!(log.current().as_deref(), Some("stockd=trace"));
    }

    #[tokio::test]
    async fn test_auth() {
        let ctx = ctx();
        let mut client = ClientState::new(false);
        let pw = [RespValue::bulk_string("pw")];
        assert!(matches!(
            cmd_auth(&pw, &mut client, &ctx.config).await,
            RespValue::Error(_)
        ));

        ctx.config.write().await.requirepass = Some("pw".into());
        assert_eq!(cmd_auth(&pw, &mut client, &ctx.config).await, RespValue::ok());
        assert!(client.authenticated);
    }

    #[test]
    fn test_client_name() {
        let mut client = ClientState::new(true);
        let setname = [RespValue::bulk_string("setname"), RespValue::bulk_string("shop-1")];
        assert_eq!(cmd_client(&setname, &mut client), RespValue::ok());
        assert_eq!(
            cmd_client(&[RespValue::bulk_string("GETNAME")], &mut client),
            RespValue::bulk_string("shop-1")
        );
    }

    #[test]
    fn test_ping() {
        assert_eq!(cmd_ping(&[]), RespValue::simple_string("PONG"));
        assert_eq!(
            cmd_ping(&[RespValue::bulk_string("hi")]),
            RespValue::bulk_string("hi")
        );
    }
}
