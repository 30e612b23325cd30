//! Database schema definitions.

/// SQL schema for the scheduling database.
pub const SCHEMA_SQL: &str = r#"
-- Tuner cards
CREATE TABLE IF NOT EXISTS cards (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    priority INTEGER DEFAULT 0,              -- Higher = tried first
    decrypt_limit INTEGER DEFAULT 0,         -- Simultaneous encrypted services (0 = no CAM)
    supports_sub_channels INTEGER DEFAULT 0, -- Several services per tuning
    enabled INTEGER DEFAULT 1,
    created_at INTEGER DEFAULT (strftime('%s', 'now'))
);

-- Channel groups
CREATE TABLE IF NOT EXISTS channel_groups (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT UNIQUE NOT NULL
);

-- Channels
CREATE TABLE IF NOT EXISTS channels (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL
);

-- Channel group membership
CREATE TABLE IF NOT EXISTS channel_group_members (
    group_id INTEGER NOT NULL,
    channel_id INTEGER NOT NULL,
    PRIMARY KEY(group_id, channel_id),
    FOREIGN KEY(group_id) REFERENCES channel_groups(id) ON DELETE CASCADE,
    FOREIGN KEY(channel_id) REFERENCES channels(id) ON DELETE CASCADE
);

-- Tuning details per (card, channel)
CREATE TABLE IF NOT EXISTS tuning_details (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    card_id INTEGER NOT NULL,
    channel_id INTEGER NOT NULL,
    name TEXT,
    is_encrypted INTEGER DEFAULT 0,
    transmitter TEXT NOT NULL,               -- JSON encoded Transmitter
    UNIQUE(card_id, channel_id),
    FOREIGN KEY(card_id) REFERENCES cards(id) ON DELETE CASCADE,
    FOREIGN KEY(channel_id) REFERENCES channels(id) ON DELETE CASCADE
);

-- Program guide
CREATE TABLE IF NOT EXISTS programs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    channel_id INTEGER NOT NULL,
    start_time TEXT NOT NULL,
    end_time TEXT NOT NULL,
    title TEXT NOT NULL,
    description TEXT DEFAULT '',
    genre TEXT DEFAULT '',
    star_rating INTEGER DEFAULT 0,
    season_number INTEGER,
    episode_number INTEGER,
    episode_title TEXT,
    FOREIGN KEY(channel_id) REFERENCES channels(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_programs_channel_time ON programs(channel_id, start_time);
CREATE INDEX IF NOT EXISTS idx_programs_title ON programs(title COLLATE NOCASE);

-- Persisted schedules
CREATE TABLE IF NOT EXISTS schedules (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    parent_id INTEGER,                       -- Recurring schedule this one was split from
    rule_id INTEGER,                         -- Rule that materialized it
    channel_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    start_time TEXT NOT NULL,
    end_time TEXT NOT NULL,
    recording_type INTEGER NOT NULL,         -- ScheduleRecordingType discriminant
    priority INTEGER DEFAULT 0,
    pre_record_minutes INTEGER DEFAULT 0,
    post_record_minutes INTEGER DEFAULT 0,
    keep_method INTEGER DEFAULT 3,           -- KeepMethod discriminant
    keep_date TEXT
);

-- Canceled occurrences of recurring schedules
CREATE TABLE IF NOT EXISTS canceled_schedules (
    schedule_id INTEGER NOT NULL,
    start_time TEXT NOT NULL,
    PRIMARY KEY(schedule_id, start_time),
    FOREIGN KEY(schedule_id) REFERENCES schedules(id) ON DELETE CASCADE
);

-- Schedule rules
CREATE TABLE IF NOT EXISTS schedule_rules (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    active INTEGER DEFAULT 1,
    channel_id INTEGER,
    channel_group_id INTEGER,
    on_or_after_day INTEGER,                 -- 1 = Monday .. 7 = Sunday
    on_or_before_day INTEGER,
    start_from_time TEXT,
    start_to_time TEXT,
    targets TEXT NOT NULL DEFAULT '[]',      -- JSON encoded search targets
    is_series INTEGER DEFAULT 0,
    series_name TEXT,
    season_number INTEGER,
    episode_number INTEGER,
    episode_title TEXT,
    episode_info_fallback INTEGER DEFAULT 0,
    episode_info_fallback_pattern TEXT,
    recording_type INTEGER DEFAULT 1,        -- RuleRecordingType discriminant
    episode_management INTEGER,              -- NULL = global setting
    priority INTEGER DEFAULT 0,
    pre_record_minutes INTEGER DEFAULT 0,
    post_record_minutes INTEGER DEFAULT 0,
    keep_method INTEGER DEFAULT 3,
    keep_date TEXT
);

-- Conflicts of the last full evaluation
CREATE TABLE IF NOT EXISTS conflicts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    card_id INTEGER,
    channel_id INTEGER NOT NULL,
    schedule_id INTEGER NOT NULL,
    conflicting_schedule_id INTEGER,
    program_start_time TEXT NOT NULL
);

-- Existing recordings
CREATE TABLE IF NOT EXISTS recordings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    channel_id INTEGER,
    title TEXT NOT NULL,
    start_time TEXT NOT NULL,
    end_time TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_recordings_title ON recordings(title COLLATE NOCASE);

-- Media library series
CREATE TABLE IF NOT EXISTS series (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT UNIQUE NOT NULL
);

CREATE TABLE IF NOT EXISTS series_episodes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    series_id INTEGER NOT NULL,
    season_number INTEGER,
    episode_number INTEGER,
    episode_title TEXT,
    FOREIGN KEY(series_id) REFERENCES series(id) ON DELETE CASCADE
);
"#;
