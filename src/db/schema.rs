/// Version stored in `PRAGMA user_version` once [`SCHEMA`] has been applied.
pub const SCHEMA_VERSION: i64 = 1;

pub const SCHEMA: &str = r#"
-- Users: accounts that create, like, and locate themselves
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY NOT NULL,
    email TEXT NOT NULL UNIQUE,
    password TEXT NOT NULL,          -- password hash, never plaintext
    name TEXT NOT NULL,
    created_at TEXT NOT NULL,
    avatar TEXT,
    address TEXT,
    is_local INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS countries (
    id TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL UNIQUE,
    code TEXT UNIQUE,
    slug TEXT UNIQUE
);

CREATE TABLE IF NOT EXISTS cities (
    id TEXT PRIMARY KEY NOT NULL,
    country_id TEXT NOT NULL,
    name TEXT NOT NULL,
    slug TEXT,
    lat REAL,
    lng REAL,
    list_count INTEGER NOT NULL DEFAULT 0 CHECK (list_count >= 0),
    google_place_id TEXT UNIQUE,
    UNIQUE (country_id, name),
    FOREIGN KEY (country_id) REFERENCES countries(id) ON DELETE RESTRICT
);

CREATE INDEX IF NOT EXISTS idx_cities_slug ON cities(slug);

CREATE TABLE IF NOT EXISTS places (
    id TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL,
    address TEXT NOT NULL,
    lat REAL NOT NULL,
    lng REAL NOT NULL,
    google_place_id TEXT NOT NULL UNIQUE,
    description TEXT,
    primary_image_url TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    city_id TEXT NOT NULL,
    FOREIGN KEY (city_id) REFERENCES cities(id) ON DELETE RESTRICT
);

CREATE INDEX IF NOT EXISTS idx_places_city ON places(city_id);

-- Lists: curated, ordered collections of places in one city
CREATE TABLE IF NOT EXISTS lists (
    id TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL,
    description TEXT,
    genre TEXT,
    subgenre TEXT,
    city_id TEXT NOT NULL,
    lat REAL,
    lng REAL,
    creator_id TEXT NOT NULL,
    -- Maintained aggregates, see db::counters
    average_rating REAL NOT NULL DEFAULT 0,
    rating_count INTEGER NOT NULL DEFAULT 0 CHECK (rating_count >= 0),
    like_count INTEGER NOT NULL DEFAULT 0 CHECK (like_count >= 0),
    place_count INTEGER NOT NULL DEFAULT 0 CHECK (place_count >= 0),
    cover_image TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    FOREIGN KEY (city_id) REFERENCES cities(id) ON DELETE RESTRICT,
    FOREIGN KEY (creator_id) REFERENCES users(id) ON DELETE RESTRICT
);

CREATE INDEX IF NOT EXISTS idx_lists_city ON lists(city_id);
CREATE INDEX IF NOT EXISTS idx_lists_creator ON lists(creator_id);
CREATE INDEX IF NOT EXISTS idx_lists_created_at ON lists(created_at);

CREATE TABLE IF NOT EXISTS list_places (
    id TEXT PRIMARY KEY NOT NULL,
    list_id TEXT NOT NULL,
    place_id TEXT NOT NULL,
    sort_order INTEGER NOT NULL CHECK (sort_order >= 0),
    note TEXT,
    price_range TEXT,
    created_at TEXT NOT NULL,
    UNIQUE (list_id, place_id),
    FOREIGN KEY (list_id) REFERENCES lists(id) ON DELETE CASCADE,
    FOREIGN KEY (place_id) REFERENCES places(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_list_places_place ON list_places(place_id);

-- Likes are keyed by (user, list); there is no synthetic id
CREATE TABLE IF NOT EXISTS list_likes (
    user_id TEXT NOT NULL,
    list_id TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (user_id, list_id),
    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
    FOREIGN KEY (list_id) REFERENCES lists(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_list_likes_list ON list_likes(list_id);

CREATE TABLE IF NOT EXISTS user_locations (
    id TEXT PRIMARY KEY NOT NULL,
    user_id TEXT NOT NULL,
    city_id TEXT NOT NULL,
    status TEXT NOT NULL CHECK (status IN ('BORN_THERE', 'LIVED_PAST', 'CURRENTLY_LIVING')),
    created_at TEXT NOT NULL,
    UNIQUE (user_id, city_id),
    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
    FOREIGN KEY (city_id) REFERENCES cities(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_user_locations_city ON user_locations(city_id);
"#;

/// Tables in foreign-key-safe order (parents first).
pub const TABLES: &[&str] = &[
    "users",
    "countries",
    "cities",
    "places",
    "lists",
    "list_places",
    "list_likes",
    "user_locations",
];
