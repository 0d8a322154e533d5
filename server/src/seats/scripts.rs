use redis::Script;
use std::sync::OnceLock;

/// `KEYS[1]` = seats hash, `KEYS[2]` = locked-seats set.
/// `ARGV[1]` = seat index, `ARGV[2]` = user id, `ARGV[3]` = seat count,
/// `ARGV[4]` = reverse-index key prefix (e.g. `room:42:seat:user:`).
///
/// Implements §4.6 `take`: bounds/lock/occupancy checks, evicts the
/// caller's prior seat if any, writes the new occupancy and reverse index.
const TAKE_SRC: &str = r#"
local seatIndex = tonumber(ARGV[1])
local userId = ARGV[2]
local seatCount = tonumber(ARGV[3])
local roomPrefix = ARGV[4]

if seatIndex == nil or seatIndex < 0 or seatIndex >= seatCount then
  return redis.error_reply("SEAT_INVALID")
end
if redis.call("SISMEMBER", KEYS[2], tostring(seatIndex)) == 1 then
  return redis.error_reply("SEAT_LOCKED")
end
if redis.call("HEXISTS", KEYS[1], tostring(seatIndex)) == 1 then
  return redis.error_reply("SEAT_TAKEN")
end

local all = redis.call("HGETALL", KEYS[1])
for i = 1, #all, 2 do
  local idx = all[i]
  local decoded = cjson.decode(all[i + 1])
  if tostring(decoded.userId) == userId then
    redis.call("HDEL", KEYS[1], idx)
    redis.call("DEL", roomPrefix .. tostring(decoded.userId))
  end
end

redis.call("HSET", KEYS[1], tostring(seatIndex), cjson.encode({ userId = tonumber(userId), muted = false }))
redis.call("SET", roomPrefix .. userId, tostring(seatIndex))
return tostring(seatIndex)
"#;

/// `KEYS[1]` = seats hash. `ARGV[1]` = user id.
/// Implements §4.6 `leave`: scans for the user's seat, deletes it and the
/// reverse index, returns the freed index or an error.
const LEAVE_SRC: &str = r#"
local userId = ARGV[1]
local roomPrefix = ARGV[2]

local all = redis.call("HGETALL", KEYS[1])
for i = 1, #all, 2 do
  local idx = all[i]
  local decoded = cjson.decode(all[i + 1])
  if tostring(decoded.userId) == userId then
    redis.call("HDEL", KEYS[1], idx)
    redis.call("DEL", roomPrefix .. userId)
    return idx
  end
end
return redis.error_reply("NOT_SEATED")
"#;

/// `KEYS[1]` = seats hash, `KEYS[2]` = locked-seats set.
/// `ARGV[1]` = seat index, `ARGV[2]` = target user id, `ARGV[3]` = seat
/// count, `ARGV[4]` = reverse-index key prefix.
/// Implements §4.6 `assign`: owner-initiated placement that displaces any
/// current occupant of the target seat and clears the target user's prior
/// seat, then writes the new occupancy.
const ASSIGN_SRC: &str = r#"
local seatIndex = tonumber(ARGV[1])
local targetUserId = ARGV[2]
local seatCount = tonumber(ARGV[3])
local roomPrefix = ARGV[4]

if seatIndex == nil or seatIndex < 0 or seatIndex >= seatCount then
  return redis.error_reply("SEAT_INVALID")
end
if redis.call("SISMEMBER", KEYS[2], tostring(seatIndex)) == 1 then
  return redis.error_reply("SEAT_LOCKED")
end

local existing = redis.call("HGET", KEYS[1], tostring(seatIndex))
if existing then
  local decoded = cjson.decode(existing)
  redis.call("HDEL", KEYS[1], tostring(seatIndex))
  redis.call("DEL", roomPrefix .. tostring(decoded.userId))
end

local all = redis.call("HGETALL", KEYS[1])
for i = 1, #all, 2 do
  local idx = all[i]
  local decoded = cjson.decode(all[i + 1])
  if tostring(decoded.userId) == targetUserId then
    redis.call("HDEL", KEYS[1], idx)
  end
end

redis.call("HSET", KEYS[1], tostring(seatIndex), cjson.encode({ userId = tonumber(targetUserId), muted = false }))
redis.call("SET", roomPrefix .. targetUserId, tostring(seatIndex))
return tostring(seatIndex)
"#;

/// `KEYS[1]` = seats hash. `ARGV[1]` = seat index, `ARGV[2]` = muted flag
/// ("1"/"0"). Implements §4.6 `setMute`.
const SET_MUTE_SRC: &str = r#"
local seatIndex = ARGV[1]
local muted = ARGV[2] == "1"

local existing = redis.call("HGET", KEYS[1], seatIndex)
if not existing then
  return 0
end
local decoded = cjson.decode(existing)
decoded.muted = muted
redis.call("HSET", KEYS[1], seatIndex, cjson.encode(decoded))
return 1
"#;

/// `KEYS[1]` = seats hash, `KEYS[2]` = locked-seats set.
/// `ARGV[1]` = seat index, `ARGV[2]` = reverse-index key prefix.
/// Implements §4.6 `lock`: evicts any occupant, adds the index to the
/// locked set, returns the evicted user id (or the empty string).
const LOCK_SRC: &str = r#"
local seatIndex = ARGV[1]
local roomPrefix = ARGV[2]

if redis.call("SISMEMBER", KEYS[2], seatIndex) == 1 then
  return redis.error_reply("ALREADY_LOCKED")
end

local kicked = ""
local existing = redis.call("HGET", KEYS[1], seatIndex)
if existing then
  local decoded = cjson.decode(existing)
  kicked = tostring(decoded.userId)
  redis.call("HDEL", KEYS[1], seatIndex)
  redis.call("DEL", roomPrefix .. kicked)
end

redis.call("SADD", KEYS[2], seatIndex)
return kicked
"#;

/// `KEYS[1]` = locked-seats set. `ARGV[1]` = seat index.
/// Implements §4.6 `unlock`.
const UNLOCK_SRC: &str = r#"
local seatIndex = ARGV[1]
if redis.call("SISMEMBER", KEYS[1], seatIndex) == 0 then
  return redis.error_reply("NOT_LOCKED")
end
redis.call("SREM", KEYS[1], seatIndex)
return 1
"#;

pub struct SeatScripts {
    pub take: Script,
    pub leave: Script,
    pub assign: Script,
    pub set_mute: Script,
    pub lock: Script,
    pub unlock: Script,
}

static SCRIPTS: OnceLock<SeatScripts> = OnceLock::new();

pub fn scripts() -> &'static SeatScripts {
    SCRIPTS.get_or_init(|| SeatScripts {
        take: Script::new(TAKE_SRC),
        leave: Script::new(LEAVE_SRC),
        assign: Script::new(ASSIGN_SRC),
        set_mute: Script::new(SET_MUTE_SRC),
        lock: Script::new(LOCK_SRC),
        unlock: Script::new(UNLOCK_SRC),
    })
}

/// Maps a Lua `redis.error_reply(...)` string surfacing through the
/// `redis` crate back to our stable ack-error taxonomy. The crate exposes
/// the raw error text via `Display`; our scripts never embed a space in
/// the code, so the whole message is the code.
pub fn classify_script_error(err: &redis::RedisError) -> &'static str {
    let msg = err.to_string();
    for code in [
        "SEAT_INVALID",
        "SEAT_LOCKED",
        "SEAT_TAKEN",
        "NOT_SEATED",
        "ALREADY_LOCKED",
        "NOT_LOCKED",
    ] {
        if msg.contains(code) {
            return code;
        }
    }
    "INTERNAL_ERROR"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_codes() {
        let err = redis::RedisError::from((redis::ErrorKind::ExtensionError, "SEAT_LOCKED"));
        assert_eq!(classify_script_error(&err), "SEAT_LOCKED");
    }

    #[test]
    fn unknown_errors_fall_back() {
        let err = redis::RedisError::from((redis::ErrorKind::IoError, "boom"));
        assert_eq!(classify_script_error(&err), "INTERNAL_ERROR");
    }
}
