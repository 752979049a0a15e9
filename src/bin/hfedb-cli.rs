//! hfedb CLI client
//!
//! Interactive client speaking VCP over TCP. Understands the baseline
//! string ops plus the full hash-field-expiration command family.

use bytes::Bytes;
use clap::Parser;
use futures::{SinkExt, StreamExt};
use hfedb::protocol::{Command, Frame, Response, VcpCodec};
use hfedb::storage::ExpireSetCond;
use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Server host
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port
    #[arg(short, long, default_value_t = 6380)]
    port: u16,
}

static REQUEST_ID: AtomicU64 = AtomicU64::new(1);

fn next_request_id() -> u64 {
    REQUEST_ID.fetch_add(1, Ordering::Relaxed)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let addr = format!("{}:{}", args.host, args.port);

    println!("Connecting to hfedb at {}...", addr);

    let stream = TcpStream::connect(&addr).await?;
    let mut framed = Framed::new(stream, VcpCodec::new());

    println!("Connected! Type 'help' for available commands, 'quit' to exit.\n");

    loop {
        print!("hfedb> ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        let input = input.trim();

        if input.is_empty() {
            continue;
        }

        if input.eq_ignore_ascii_case("quit") || input.eq_ignore_ascii_case("exit") {
            println!("Goodbye!");
            break;
        }

        if input.eq_ignore_ascii_case("help") {
            print_help();
            continue;
        }

        match parse_command(input) {
            Ok(cmd) => {
                let request_id = next_request_id();
                let (opcode, payload) = cmd.encode();
                let frame = Frame::new(opcode, request_id, payload);

                framed.send(frame).await?;

                match framed.next().await {
                    Some(Ok(response_frame)) => {
                        let response = Response::from_frame(&response_frame)?;
                        println!("{}", response);
                    }
                    Some(Err(e)) => {
                        eprintln!("Error: {}", e);
                    }
                    None => {
                        eprintln!("Connection closed by server");
                        break;
                    }
                }
            }
            Err(e) => {
                eprintln!("Error: {}", e);
            }
        }
    }

    Ok(())
}

fn bytes(s: &str) -> Bytes {
    Bytes::copy_from_slice(s.as_bytes())
}

/// Parses the `[NX|XX|GT|LT]` condition qualifier the `HEXPIRE` family
/// accepts, consuming it from `parts` if present.
fn take_cond(parts: &mut Vec<&str>) -> anyhow::Result<ExpireSetCond> {
    if parts.is_empty() {
        return Ok(ExpireSetCond::None);
    }
    let cond = match parts[0].to_uppercase().as_str() {
        "NX" => Some(ExpireSetCond::Nx),
        "XX" => Some(ExpireSetCond::Xx),
        "GT" => Some(ExpireSetCond::Gt),
        "LT" => Some(ExpireSetCond::Lt),
        _ => None,
    };
    if let Some(cond) = cond {
        parts.remove(0);
        Ok(cond)
    } else {
        Ok(ExpireSetCond::None)
    }
}

/// Parses the trailing `FIELDS n f1 f2 ...` clause shared by the
/// `HEXPIRE`/`HTTL`/`HPERSIST` families.
fn take_fields(parts: &[&str]) -> anyhow::Result<Vec<Bytes>> {
    if parts.is_empty() || !parts[0].eq_ignore_ascii_case("FIELDS") {
        anyhow::bail!("expected FIELDS n field...");
    }
    let count: usize = parts.get(1).ok_or_else(|| anyhow::anyhow!("missing field count"))?.parse()?;
    let fields: Vec<Bytes> = parts[2..].iter().map(|f| bytes(f)).collect();
    if fields.len() != count {
        anyhow::bail!("FIELDS count {} does not match {} fields given", count, fields.len());
    }
    Ok(fields)
}

fn parse_command(input: &str) -> anyhow::Result<Command> {
    let all_parts: Vec<&str> = input.split_whitespace().collect();

    if all_parts.is_empty() {
        anyhow::bail!("Empty command");
    }

    let cmd = all_parts[0].to_uppercase();
    let parts = &all_parts[1..];

    match cmd.as_str() {
        "PING" => Ok(Command::Ping),

        "GET" => {
            let key = parts.first().ok_or_else(|| anyhow::anyhow!("GET requires a key: GET <key>"))?;
            Ok(Command::Get { key: bytes(key) })
        }

        "SET" => {
            if parts.len() < 2 {
                anyhow::bail!("SET requires key and value: SET <key> <value> [ttl_ms]");
            }
            let ttl = if parts.len() > 2 { Some(parts[2].parse::<u64>()?) } else { None };
            Ok(Command::Set { key: bytes(parts[0]), value: bytes(parts[1]), ttl })
        }

        "DEL" => {
            let key = parts.first().ok_or_else(|| anyhow::anyhow!("DEL requires a key: DEL <key>"))?;
            Ok(Command::Del { key: bytes(key) })
        }

        "EXISTS" => {
            let key = parts.first().ok_or_else(|| anyhow::anyhow!("EXISTS requires a key: EXISTS <key>"))?;
            Ok(Command::Exists { key: bytes(key) })
        }

        "HSET" => {
            if parts.len() < 3 || (parts.len() - 1) % 2 != 0 {
                anyhow::bail!("HSET requires key and field/value pairs: HSET <key> <f1> <v1> [f2 v2 ...]");
            }
            let key = bytes(parts[0]);
            let fields = parts[1..].chunks(2).map(|c| (bytes(c[0]), bytes(c[1]))).collect();
            Ok(Command::HSet { key, fields })
        }

        "HSETNX" => {
            if parts.len() != 3 {
                anyhow::bail!("HSETNX requires key, field, value: HSETNX <key> <field> <value>");
            }
            Ok(Command::HSetNx { key: bytes(parts[0]), field: bytes(parts[1]), value: bytes(parts[2]) })
        }

        "HGET" => {
            if parts.len() != 2 {
                anyhow::bail!("HGET requires key and field: HGET <key> <field>");
            }
            Ok(Command::HGet { key: bytes(parts[0]), field: bytes(parts[1]) })
        }

        "HMGET" => {
            if parts.len() < 2 {
                anyhow::bail!("HMGET requires key and at least one field: HMGET <key> <f1> [f2 ...]");
            }
            Ok(Command::HMGet { key: bytes(parts[0]), fields: parts[1..].iter().map(|f| bytes(f)).collect() })
        }

        "HGETALL" => {
            let key = parts.first().ok_or_else(|| anyhow::anyhow!("HGETALL requires a key: HGETALL <key>"))?;
            Ok(Command::HGetAll { key: bytes(key) })
        }

        "HKEYS" => {
            let key = parts.first().ok_or_else(|| anyhow::anyhow!("HKEYS requires a key: HKEYS <key>"))?;
            Ok(Command::HKeys { key: bytes(key) })
        }

        "HVALS" => {
            let key = parts.first().ok_or_else(|| anyhow::anyhow!("HVALS requires a key: HVALS <key>"))?;
            Ok(Command::HVals { key: bytes(key) })
        }

        "HEXISTS" => {
            if parts.len() != 2 {
                anyhow::bail!("HEXISTS requires key and field: HEXISTS <key> <field>");
            }
            Ok(Command::HExists { key: bytes(parts[0]), field: bytes(parts[1]) })
        }

        "HLEN" => {
            let key = parts.first().ok_or_else(|| anyhow::anyhow!("HLEN requires a key: HLEN <key>"))?;
            Ok(Command::HLen { key: bytes(key) })
        }

        "HSTRLEN" => {
            if parts.len() != 2 {
                anyhow::bail!("HSTRLEN requires key and field: HSTRLEN <key> <field>");
            }
            Ok(Command::HStrlen { key: bytes(parts[0]), field: bytes(parts[1]) })
        }

        "HSCAN" => {
            if parts.len() < 2 {
                anyhow::bail!("HSCAN requires key and cursor: HSCAN <key> <cursor> [count]");
            }
            let count = parts.get(2).map(|c| c.parse::<u32>()).transpose()?.unwrap_or(10);
            Ok(Command::HScan { key: bytes(parts[0]), cursor: parts[1].parse()?, count })
        }

        "HINCRBY" => {
            if parts.len() != 3 {
                anyhow::bail!("HINCRBY requires key, field, delta: HINCRBY <key> <field> <delta>");
            }
            Ok(Command::HIncrBy { key: bytes(parts[0]), field: bytes(parts[1]), delta: parts[2].parse()? })
        }

        "HINCRBYFLOAT" => {
            if parts.len() != 3 {
                anyhow::bail!("HINCRBYFLOAT requires key, field, delta: HINCRBYFLOAT <key> <field> <delta>");
            }
            Ok(Command::HIncrByFloat { key: bytes(parts[0]), field: bytes(parts[1]), delta: parts[2].parse()? })
        }

        "HDEL" => {
            if parts.len() < 2 {
                anyhow::bail!("HDEL requires key and at least one field: HDEL <key> <f1> [f2 ...]");
            }
            Ok(Command::HDel { key: bytes(parts[0]), fields: parts[1..].iter().map(|f| bytes(f)).collect() })
        }

        "HEXPIRE" | "HPEXPIRE" | "HEXPIREAT" | "HPEXPIREAT" => {
            if parts.len() < 2 {
                anyhow::bail!("{} requires key and ttl/timestamp: {} <key> <n> [NX|XX|GT|LT] FIELDS <count> <f1> ...", cmd, cmd);
            }
            let key = bytes(parts[0]);
            let n: i64 = parts[1].parse()?;
            let mut rest: Vec<&str> = parts[2..].to_vec();
            let cond = take_cond(&mut rest)?;
            let fields = take_fields(&rest)?;
            let now = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_millis() as u64;
            let expire_at_ms = match cmd.as_str() {
                "HEXPIRE" => now + (n as u64) * 1000,
                "HPEXPIRE" => now + n as u64,
                "HEXPIREAT" => (n as u64) * 1000,
                "HPEXPIREAT" => n as u64,
                _ => unreachable!(),
            };
            Ok(Command::HExpire { key, fields, expire_at_ms, cond })
        }

        "HTTL" | "HPTTL" | "HEXPIRETIME" | "HPEXPIRETIME" => {
            if parts.is_empty() {
                anyhow::bail!("{} requires a key: {} <key> FIELDS <count> <f1> ...", cmd, cmd);
            }
            let (absolute, unit_ms) = match cmd.as_str() {
                "HTTL" => (false, false),
                "HPTTL" => (false, true),
                "HEXPIRETIME" => (true, false),
                "HPEXPIRETIME" => (true, true),
                _ => unreachable!(),
            };
            let key = bytes(parts[0]);
            let fields = take_fields(&parts[1..])?;
            Ok(Command::HTtl { key, fields, absolute, unit_ms })
        }

        "HPERSIST" => {
            if parts.is_empty() {
                anyhow::bail!("HPERSIST requires a key: HPERSIST <key> FIELDS <count> <f1> ...");
            }
            let key = bytes(parts[0]);
            let fields = take_fields(&parts[1..])?;
            Ok(Command::HPersist { key, fields })
        }

        "HRANDFIELD" => {
            if parts.is_empty() {
                anyhow::bail!("HRANDFIELD requires a key: HRANDFIELD <key> [count [WITHVALUES]]");
            }
            let key = bytes(parts[0]);
            let count = parts.get(1).map(|c| c.parse::<i64>()).transpose()?;
            let with_values = parts.get(2).map(|v| v.eq_ignore_ascii_case("WITHVALUES")).unwrap_or(false);
            Ok(Command::HRandField { key, count, with_values })
        }

        _ => anyhow::bail!("Unknown command: {}. Type 'help' for available commands.", cmd),
    }
}

fn print_help() {
    println!(
        r#"
Available commands:

  PING
  GET <key>
  SET <key> <value> [ttl_ms]
  DEL <key>
  EXISTS <key>

  HSET <key> <f1> <v1> [f2 v2 ...]
  HSETNX <key> <field> <value>
  HGET <key> <field>
  HMGET <key> <f1> [f2 ...]
  HGETALL <key>
  HKEYS <key>
  HVALS <key>
  HEXISTS <key> <field>
  HLEN <key>
  HSTRLEN <key> <field>
  HSCAN <key> <cursor> [count]
  HINCRBY <key> <field> <delta>
  HINCRBYFLOAT <key> <field> <delta>
  HDEL <key> <f1> [f2 ...]

  HEXPIRE/HPEXPIRE/HEXPIREAT/HPEXPIREAT <key> <n> [NX|XX|GT|LT] FIELDS <count> <f1> ...
  HTTL/HPTTL/HEXPIRETIME/HPEXPIRETIME <key> FIELDS <count> <f1> ...
  HPERSIST <key> FIELDS <count> <f1> ...
  HRANDFIELD <key> [count [WITHVALUES]]

  help              - Show this help
  quit / exit       - Exit the CLI

Examples:
  HSET h a 1 b 2
  HEXPIRE h 10 FIELDS 1 a
  HTTL h FIELDS 1 a
  HRANDFIELD h 2 WITHVALUES
"#
    );
}
