//! # Command Registry
//!
//! Purpose: Bind each upper-cased command name to syntactic validation
//! and an executor, and mark which commands propagate to replicas.
//!
//! ## Design Principles
//! 1. **Validate, Then Execute**: a command's argument shape is checked
//!    before touching the cache, so malformed input never reaches it.
//! 2. **Replica-Aware Reply Suppression**: `SET`/`DELETE` return an empty
//!    reply on a replica instance, matching the propagated-mutation path
//!    that must produce no wire traffic back to the master.
//! 3. **`REPLSYNC` Is Special-Cased By The Caller**: registering a new
//!    replica needs this connection's own write half, which the registry
//!    does not have access to; `connection.rs` intercepts it before
//!    falling through to [`execute`].

use tidekv_common::codec::{encode_bulk, encode_nil_bulk, encode_simple};
use tidekv_common::info::ServerInfo;
use tidekv_engine::Cache;

/// The set of commands whose mutations propagate to attached replicas.
pub fn is_mutating(name_upper: &[u8]) -> bool {
    matches!(name_upper, b"SET" | b"DELETE")
}

/// Upper-cases a command name for case-insensitive matching.
pub fn upper(name: &[u8]) -> Vec<u8> {
    name.to_ascii_uppercase()
}

/// Purely syntactic validation; does not touch the cache.
pub fn validate(name_upper: &[u8], args: &[Vec<u8>]) -> Result<(), String> {
    match name_upper {
        b"PING" | b"INFO" | b"REPLSYNC" => {
            if args.is_empty() {
                Ok(())
            } else {
                Err(format!(
                    "wrong number of arguments for {}",
                    String::from_utf8_lossy(name_upper)
                ))
            }
        }
        b"ECHO" => {
            if args.is_empty() {
                Err("wrong number of arguments for ECHO".to_string())
            } else {
                Ok(())
            }
        }
        b"GET" | b"DELETE" | b"FULLSYNC" => {
            if args.len() == 1 {
                Ok(())
            } else {
                Err(format!(
                    "wrong number of arguments for {}",
                    String::from_utf8_lossy(name_upper)
                ))
            }
        }
        b"SET" => validate_set(args),
        _ => Err("unknown command".to_string()),
    }
}

fn validate_set(args: &[Vec<u8>]) -> Result<(), String> {
    match args.len() {
        2 => Ok(()),
        4 => {
            let px = &args[args.len() - 2];
            let value = &args[args.len() - 1];
            if !px.eq_ignore_ascii_case(b"PX") {
                return Err("SET expects PX as the second-to-last argument".to_string());
            }
            parse_i64(value)
                .map(|_| ())
                .map_err(|_| "PX value must be numeric".to_string())
        }
        _ => Err("wrong number of arguments for SET".to_string()),
    }
}

fn parse_i64(data: &[u8]) -> Result<i64, ()> {
    std::str::from_utf8(data).ok().and_then(|s| s.parse::<i64>().ok()).ok_or(())
}

/// What a dispatched command asks the caller to do.
pub enum Dispatch {
    /// Write these bytes back on the same connection (may be empty,
    /// meaning "suppress the reply").
    Reply(Vec<u8>),
    /// This connection just issued a validated `REPLSYNC`; the caller
    /// must register it as a replica and reply with a full sync.
    ReplSync,
}

/// Executes a validated command. `REPLSYNC` is recognized but not
/// applied here — see [`Dispatch::ReplSync`].
pub fn execute(name_upper: &[u8], args: &[Vec<u8>], cache: &Cache, info: &ServerInfo) -> Dispatch {
    match name_upper {
        b"PING" => Dispatch::Reply(encode_simple("PONG")),
        b"INFO" => Dispatch::Reply(encode_bulk(info.role_line().as_bytes())),
        b"ECHO" => Dispatch::Reply(encode_bulk(&join_with_spaces(args))),
        b"GET" => match cache.get(&args[0]) {
            Some(value) => Dispatch::Reply(encode_bulk(&value)),
            None => Dispatch::Reply(encode_nil_bulk()),
        },
        b"SET" => {
            let ttl_ms = if args.len() == 4 {
                parse_i64(&args[3]).ok()
            } else {
                None
            };
            cache.set(args[0].as_slice().into(), args[1].as_slice().into(), ttl_ms);
            Dispatch::Reply(reply_unless_replica(info))
        }
        b"DELETE" => {
            cache.delete(&args[0]);
            Dispatch::Reply(reply_unless_replica(info))
        }
        b"REPLSYNC" => Dispatch::ReplSync,
        // Only reachable if a peer sends a bare FULLSYNC frame directly;
        // during the replica handshake this name is read off the reply
        // array in replication.rs, never through this registry.
        b"FULLSYNC" => Dispatch::Reply(Vec::new()),
        _ => unreachable!("validate() rejects unknown commands before execute() is called"),
    }
}

fn reply_unless_replica(info: &ServerInfo) -> Vec<u8> {
    if info.is_replica() {
        Vec::new()
    } else {
        encode_simple("OK")
    }
}

fn join_with_spaces(args: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();
    for (idx, arg) in args.iter().enumerate() {
        if idx > 0 {
            out.push(b' ');
        }
        out.extend_from_slice(arg);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_accepts_two_or_four_args() {
        assert!(validate(b"SET", &[b"k".to_vec(), b"v".to_vec()]).is_ok());
        assert!(validate(b"SET", &[b"k".to_vec(), b"v".to_vec(), b"PX".to_vec(), b"10".to_vec()]).is_ok());
        assert!(validate(b"SET", &[b"k".to_vec()]).is_err());
    }

    #[test]
    fn set_rejects_non_px_penultimate_argument() {
        let err = validate(b"SET", &[b"k".to_vec(), b"v".to_vec(), b"EX".to_vec(), b"10".to_vec()]);
        assert!(err.is_err());
    }

    #[test]
    fn set_rejects_non_numeric_px_value() {
        let err = validate(b"SET", &[b"k".to_vec(), b"v".to_vec(), b"PX".to_vec(), b"soon".to_vec()]);
        assert!(err.is_err());
    }

    #[test]
    fn echo_requires_at_least_one_argument() {
        assert!(validate(b"ECHO", &[]).is_err());
        assert!(validate(b"ECHO", &[b"hi".to_vec()]).is_ok());
    }

    #[test]
    fn unknown_command_is_rejected() {
        assert!(validate(b"NOPE", &[]).is_err());
    }

    #[test]
    fn get_reply_suppressed_only_for_mutating_commands_on_replica() {
        let cache = Cache::new(1, 10);
        let info = ServerInfo::replica(6381, "m:6380".to_string());
        match execute(b"SET", &[b"k".to_vec(), b"v".to_vec()], &cache, &info) {
            Dispatch::Reply(bytes) => assert!(bytes.is_empty()),
            _ => panic!("expected Reply"),
        }
        match execute(b"GET", &[b"k".to_vec()], &cache, &info) {
            Dispatch::Reply(bytes) => assert!(!bytes.is_empty()),
            _ => panic!("expected Reply"),
        }
    }

    #[test]
    fn echo_joins_arguments_with_single_spaces() {
        let cache = Cache::new(1, 10);
        let info = ServerInfo::master(6380);
        match execute(b"ECHO", &[b"a".to_vec(), b"b".to_vec(), b"c".to_vec()], &cache, &info) {
            Dispatch::Reply(bytes) => assert_eq!(bytes, tidekv_common::codec::encode_bulk(b"a b c")),
            _ => panic!("expected Reply"),
        }
    }
}
