use crate::command::{arg_to_i64, arg_to_string, not_integer, wrong_arg_count};
use crate::config::SharedConfig;
use crate::error::LedgerError;
use crate::glob::glob_match;
use crate::ledger::Ledger;
use crate::resp::RespValue;

/// Stock quantity argument: any integer >= 0.
fn quantity_arg(arg: &RespValue) -> Result<u64, RespValue> {
    let n = arg_to_i64(arg).ok_or_else(not_integer)?;
    u64::try_from(n).map_err(|_| LedgerError::InvalidAmount(n).into())
}

/// Reserve/restock argument: any integer > 0.
fn amount_arg(arg: &RespValue) -> Result<u64, RespValue> {
    let n = arg_to_i64(arg).ok_or_else(not_integer)?;
    if n <= 0 {
        return Err(LedgerError::InvalidAmount(n).into());
    }
    Ok(n as u64)
}

fn key_arg(arg: &RespValue) -> Result<String, RespValue> {
    arg_to_string(arg).ok_or_else(|| RespValue::error("ERR invalid key"))
}

// STOCK.INIT key quantity
pub fn cmd_init(args: &[RespValue], ledger: &Ledger) -> RespValue {
    if args.len() != 2 {
        return wrong_arg_count("stock.init");
    }
    let result = key_arg(&args[0]).and_then(|key| {
        let quantity = quantity_arg(&args[1])?;
        ledger.initialize(&key, quantity).map_err(RespValue::from)
    });
    match result {
        Ok(()) => RespValue::ok(),
        Err(e) => e,
    }
}

// STOCK.MINIT key quantity [key quantity ...]
pub fn cmd_minit(args: &[RespValue], ledger: &Ledger) -> RespValue {
    if args.is_empty() || args.len() % 2 != 0 {
        return wrong_arg_count("stock.minit");
    }
    // Validate the whole batch before loading any of it.
    let mut items = Vec::with_capacity(args.len() / 2);
    for pair in args.chunks(2) {
        let item = key_arg(&pair[0]).and_then(|key| Ok((key, quantity_arg(&pair[1])?)));
        match item {
            Ok(item) => items.push(item),
            Err(e) => return e,
        }
    }
    RespValue::unsigned(ledger.initialize_many(items) as u64)
}

// STOCK.RESERVE key amount -> [granted, remaining]
pub fn cmd_reserve(args: &[RespValue], ledger: &Ledger) -> RespValue {
    if args.len() != 2 {
        return wrong_arg_count("stock.reserve");
    }
    let result = key_arg(&args[0]).and_then(|key| {
        let amount = amount_arg(&args[1])?;
        ledger.reserve(&key, amount).map_err(RespValue::from)
    });
    match result {
        Ok(r) => RespValue::array(vec![
            RespValue::integer(i64::from(r.granted)),
            RespValue::unsigned(r.remaining),
        ]),
        Err(e) => e,
    }
}

// STOCK.RESTOCK key amount -> available
pub fn cmd_restock(args: &[RespValue], ledger: &Ledger) -> RespValue {
    if args.len() != 2 {
        return wrong_arg_count("stock.restock");
    }
    let result = key_arg(&args[0]).and_then(|key| {
        let amount = amount_arg(&args[1])?;
        // keep every quantity representable as a RESP integer
        ledger
            .restock_bounded(&key, amount, i64::MAX as u64)
            .map_err(RespValue::from)
    });
    match result {
        Ok(available) => RespValue::unsigned(available),
        Err(e) => e,
    }
}

// STOCK.PEEK key -> [available, version]
pub fn cmd_peek(args: &[RespValue], ledger: &Ledger) -> RespValue {
    if args.len() != 1 {
        return wrong_arg_count("stock.peek");
    }
    let result = key_arg(&args[0]).and_then(|key| ledger.peek(&key).map_err(RespValue::from));
    match result {
        Ok(snap) => RespValue::array(vec![
            RespValue::unsigned(snap.available),
            RespValue::unsigned(snap.version),
        ]),
        Err(e) => e,
    }
}

// STOCK.LOWSTOCK [threshold] -> [key, available, ...]
pub async fn cmd_lowstock(args: &[RespValue], ledger: &Ledger, config: &SharedConfig) -> RespValue {
    let threshold = match args {
        [] => config.read().await.low_stock_threshold,
        [arg] => match quantity_arg(arg) {
            Ok(t) => t,
            Err(e) => return e,
        },
        _ => return wrong_arg_count("stock.lowstock"),
    };
    let items = ledger
        .low_stock(threshold)
        .into_iter()
        .flat_map(|level| {
            [
                RespValue::bulk_string(level.key.into_bytes()),
                RespValue::unsigned(level.available),
            ]
        })
        .collect();
    RespValue::array(items)
}

// STOCK.REMOVE key
pub fn cmd_remove(args: &[RespValue], ledger: &Ledger) -> RespValue {
    if args.len() != 1 {
        return wrong_arg_count("stock.remove");
    }
    match key_arg(&args[0]).and_then(|key| ledger.remove(&key).map_err(RespValue::from)) {
        Ok(_) => RespValue::integer(1),
        Err(e) => e,
    }
}

// STOCK.KEYS [pattern]
pub fn cmd_keys(args: &[RespValue], ledger: &Ledger) -> RespValue {
    let pattern = match args {
        [] => "*".to_string(),
        [arg] => match arg_to_string(arg) {
            Some(p) => p,
            None => return RespValue::error("ERR invalid pattern"),
        },
        _ => return wrong_arg_count("stock.keys"),
    };
    RespValue::array(
        ledger
            .keys()
            .into_iter()
            .filter(|k| glob_match(&pattern, k))
            .map(|k| RespValue::bulk_string(k.into_bytes()))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(parts: &[&str]) -> Vec<RespValue> {
        parts.iter().map(|p| RespValue::bulk_string(*p)).collect()
    }

    fn pair(a: i64, b: i64) -> RespValue {
        RespValue::array(vec![RespValue::Integer(a), RespValue::Integer(b)])
    }

    #[test]
    fn test_reserve_reply_shape() {
        let ledger = Ledger::new();
        assert_eq!(cmd_init(&args(&["PROD_123", "10"]), &ledger), RespValue::ok());
        assert_eq!(cmd_reserve(&args(&["PROD_123", "3"]), &ledger), pair(1, 7));
        assert_eq!(cmd_reserve(&args(&["PROD_123", "8"]), &ledger), pair(0, 7));
        assert_eq!(cmd_restock(&args(&["PROD_123", "5"]), &ledger), RespValue::Integer(12));
        assert_eq!(cmd_peek(&args(&["PROD_123"]), &ledger), pair(12, 2));
    }

    #[test]
    fn test_argument_errors() {
        let ledger = Ledger::new();
        cmd_init(&args(&["sku", "1"]), &ledger);

        assert_eq!(
            cmd_reserve(&args(&["sku", "0"]), &ledger),
            RespValue::from(LedgerError::InvalidAmount(0))
        );
        assert_eq!(
            cmd_restock(&args(&["sku", "-4"]), &ledger),
            RespValue::from(LedgerError::InvalidAmount(-4))
        );
        assert_eq!(cmd_reserve(&args(&["sku", "many"]), &ledger), not_integer());
        assert_eq!(
            cmd_init(&args(&["neg", "-1"]), &ledger),
            RespValue::from(LedgerError::InvalidAmount(-1))
        );
        assert_eq!(cmd_reserve(&args(&["sku"]), &ledger), wrong_arg_count("stock.reserve"));
        assert_eq!(
            cmd_reserve(&args(&["ghost", "1"]), &ledger),
            RespValue::from(LedgerError::NotFound("ghost".into()))
        );
        assert_eq!(
            cmd_init(&args(&["sku", "4"]), &ledger),
            RespValue::from(LedgerError::AlreadyExists("sku".into()))
        );
    }

    #[test]
    fn test_restock_past_wire_range_is_rejected() {
        let ledger = Ledger::new();
        let near_max = (i64::MAX - 1).to_string();
        cmd_init(&args(&["sku", near_max.as_str()]), &ledger);

        assert_eq!(
            cmd_restock(&args(&["sku", "2"]), &ledger),
            RespValue::from(LedgerError::InvalidAmount(2))
        );
        assert_eq!(cmd_restock(&args(&["sku", "1"]), &ledger), RespValue::Integer(i64::MAX));
        assert_eq!(
            cmd_peek(&args(&["sku"]), &ledger),
            pair(i64::MAX, 1)
        );
    }

    #[test]
    fn test_minit_validates_before_loading() {
        let ledger = Ledger::new();
        assert_eq!(cmd_minit(&args(&["a", "1", "b", "x"]), &ledger), not_integer());
        assert!(ledger.is_empty());
        assert_eq!(cmd_minit(&args(&["a", "1", "b"]), &ledger), wrong_arg_count("stock.minit"));
        assert_eq!(
            cmd_minit(&args(&["a", "1", "b", "2", "a", "3"]), &ledger),
            RespValue::Integer(2)
        );
    }

    #[test]
    fn test_remove_and_keys() {
        let ledger = Ledger::new();
        cmd_minit(&args(&["PROD_1", "1", "PROD_2", "2", "SKU_9", "9"]), &ledger);
        assert_eq!(
            cmd_keys(&args(&["PROD_*"]), &ledger),
            RespValue::array(vec![RespValue::bulk_string("PROD_1"), RespValue::bulk_string("PROD_2")])
        );
        assert_eq!(cmd_remove(&args(&["PROD_1"]), &ledger), RespValue::Integer(1));
        assert_eq!(
            cmd_remove(&args(&["PROD_1"]), &ledger),
            RespValue::from(LedgerError::NotFound("PROD_1".into()))
        );
        assert_eq!(
            cmd_keys(&[], &ledger),
            RespValue::array(vec![RespValue::bulk_string("PROD_2"), RespValue::bulk_string("SKU_9")])
        );
    }
}
