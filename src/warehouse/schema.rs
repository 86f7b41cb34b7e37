//! Relation definitions
//!
//! The seven relations are described once as column lists and rendered per
//! dialect. Redshift output reproduces the production DDL token for token,
//! including the placement hints. DuckDB output keeps names, types and
//! nullability, and emulates the identity column with a sequence.

use crate::statement::{Dialect, Relation, quote_ident};

/// Column types used by the warehouse
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Varchar,
    Integer,
    /// 8-byte float (`float` in Redshift)
    Float,
    /// Exact integer-valued numeric (`numeric` is `numeric(18,0)` in Redshift)
    Numeric,
}

impl ColumnType {
    pub fn render(&self, dialect: Dialect) -> &'static str {
        match (self, dialect) {
            (ColumnType::Varchar, Dialect::Redshift) => "varchar",
            (ColumnType::Integer, Dialect::Redshift) => "integer",
            (ColumnType::Float, Dialect::Redshift) => "float",
            (ColumnType::Numeric, Dialect::Redshift) => "numeric",
            (ColumnType::Varchar, Dialect::DuckDb) => "VARCHAR",
            (ColumnType::Integer, Dialect::DuckDb) => "INTEGER",
            (ColumnType::Float, Dialect::DuckDb) => "DOUBLE",
            (ColumnType::Numeric, Dialect::DuckDb) => "NUMERIC(18,0)",
        }
    }
}

/// A column of a relation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: &'static str,
    pub ty: ColumnType,
    pub not_null: bool,
    pub identity: bool,
    pub sort_key: bool,
    pub dist_key: bool,
}

impl ColumnDef {
    const fn new(name: &'static str, ty: ColumnType) -> Self {
        Self {
            name,
            ty,
            not_null: false,
            identity: false,
            sort_key: false,
            dist_key: false,
        }
    }

    const fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    const fn identity(mut self) -> Self {
        self.identity = true;
        self
    }

    const fn sort_key(mut self) -> Self {
        self.sort_key = true;
        self
    }

    const fn dist_key(mut self) -> Self {
        self.dist_key = true;
        self
    }
}

/// A relation and its columns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableDef {
    pub relation: Relation,
    pub columns: &'static [ColumnDef],
    /// Replicate the whole table to every node
    pub diststyle_all: bool,
}

use ColumnType::{Float, Integer, Numeric, Varchar};

pub const EVENTS_STAGING: TableDef = TableDef {
    relation: Relation::EventsStaging,
    columns: &[
        ColumnDef::new("artist", Varchar),
        ColumnDef::new("auth", Varchar),
        ColumnDef::new("firstName", Varchar),
        ColumnDef::new("gender", Varchar),
        ColumnDef::new("itemInSession", Integer),
        ColumnDef::new("lastName", Varchar),
        ColumnDef::new("length", Float),
        ColumnDef::new("level", Varchar),
        ColumnDef::new("location", Varchar),
        ColumnDef::new("method", Varchar),
        ColumnDef::new("page", Varchar),
        ColumnDef::new("registration", Float),
        ColumnDef::new("sessionId", Integer),
        ColumnDef::new("song", Varchar),
        ColumnDef::new("status", Integer),
        ColumnDef::new("ts", Numeric),
        ColumnDef::new("userAgent", Varchar),
        ColumnDef::new("userId", Integer),
    ],
    diststyle_all: false,
};

pub const SONGS_STAGING: TableDef = TableDef {
    relation: Relation::SongsStaging,
    columns: &[
        ColumnDef::new("num_songs", Integer),
        ColumnDef::new("artist_id", Varchar),
        ColumnDef::new("artist_latitude", Float),
        ColumnDef::new("artist_longitude", Float),
        ColumnDef::new("artist_location", Varchar),
        ColumnDef::new("artist_name", Varchar),
        ColumnDef::new("song_id", Varchar),
        ColumnDef::new("title", Varchar),
        ColumnDef::new("duration", Float),
        ColumnDef::new("year", Integer),
    ],
    diststyle_all: false,
};

pub const SONGPLAYS: TableDef = TableDef {
    relation: Relation::Songplays,
    columns: &[
        ColumnDef::new("sps_songplay_id", Integer).identity().not_null(),
        ColumnDef::new("sps_ts", Numeric).not_null(),
        ColumnDef::new("sps_user_id", Integer).not_null(),
        ColumnDef::new("sps_level", Varchar),
        ColumnDef::new("sps_song_id", Varchar).dist_key(),
        ColumnDef::new("sps_artist_id", Varchar).sort_key(),
        ColumnDef::new("sps_session_id", Integer),
        ColumnDef::new("sps_artist_location", Varchar),
        ColumnDef::new("sps_user_agent", Varchar),
    ],
    diststyle_all: false,
};

pub const USERS: TableDef = TableDef {
    relation: Relation::Users,
    columns: &[
        ColumnDef::new("u_user_id", Integer).sort_key(),
        ColumnDef::new("u_first_name", Varchar),
        ColumnDef::new("u_last_name", Varchar),
        ColumnDef::new("u_gender", Varchar),
        ColumnDef::new("u_level", Varchar),
    ],
    diststyle_all: true,
};

pub const SONGS: TableDef = TableDef {
    relation: Relation::Songs,
    columns: &[
        ColumnDef::new("sgs_song_id", Varchar).sort_key().dist_key(),
        ColumnDef::new("sgs_title", Varchar),
        ColumnDef::new("sgs_artist_id", Varchar),
        ColumnDef::new("sgs_year", Integer),
        ColumnDef::new("sgs_duration", Float),
    ],
    diststyle_all: false,
};

pub const ARTISTS: TableDef = TableDef {
    relation: Relation::Artists,
    columns: &[
        ColumnDef::new("a_artist_id", Varchar).not_null().sort_key(),
        ColumnDef::new("a_artist_name", Varchar),
        ColumnDef::new("a_artist_location", Varchar),
        ColumnDef::new("a_artist_latitude", Float),
        ColumnDef::new("a_artist_longitude", Float),
    ],
    diststyle_all: true,
};

pub const TIME: TableDef = TableDef {
    relation: Relation::Time,
    columns: &[
        ColumnDef::new("t_ts", Numeric).not_null().sort_key(),
        ColumnDef::new("t_hour", Integer),
        ColumnDef::new("t_day", Integer),
        ColumnDef::new("t_week", Integer),
        ColumnDef::new("t_month", Integer),
        ColumnDef::new("t_year", Integer),
        ColumnDef::new("t_dayofweek", Integer),
    ],
    diststyle_all: true,
};

/// Sequence backing the songplay identity in DuckDB
pub const SONGPLAY_ID_SEQUENCE: &str = "songplays_id_seq";

/// Relation definition helper
pub struct WarehouseSchema;

impl WarehouseSchema {
    /// Definition of a relation
    pub fn table(relation: Relation) -> &'static TableDef {
        match relation {
            Relation::EventsStaging => &EVENTS_STAGING,
            Relation::SongsStaging => &SONGS_STAGING,
            Relation::Songplays => &SONGPLAYS,
            Relation::Users => &USERS,
            Relation::Songs => &SONGS,
            Relation::Artists => &ARTISTS,
            Relation::Time => &TIME,
        }
    }

    /// `DROP TABLE IF EXISTS` for a relation
    pub fn drop_table_sql(relation: Relation, dialect: Dialect) -> String {
        match dialect {
            Dialect::Redshift => format!("DROP TABLE IF EXISTS {}", relation.table_name()),
            Dialect::DuckDb => format!("DROP TABLE IF EXISTS {}", relation.quoted()),
        }
    }

    /// `CREATE TABLE` for a relation
    pub fn create_table_sql(relation: Relation, dialect: Dialect) -> String {
        let table = Self::table(relation);
        let columns: Vec<String> = table
            .columns
            .iter()
            .map(|c| format!("    {}", Self::column_sql(c, dialect)))
            .collect();

        let mut sql = format!(
            "CREATE TABLE {} (\n{}\n)",
            relation.quoted(),
            columns.join(",\n")
        );
        if dialect == Dialect::Redshift && table.diststyle_all {
            sql.push_str(" diststyle all");
        }
        sql.push(';');
        sql
    }

    fn column_sql(column: &ColumnDef, dialect: Dialect) -> String {
        let mut parts = vec![quote_ident(column.name), column.ty.render(dialect).to_string()];

        if column.identity {
            match dialect {
                Dialect::Redshift => parts.push("identity(1,1)".to_string()),
                Dialect::DuckDb => {
                    parts.push(format!("DEFAULT nextval('{}')", SONGPLAY_ID_SEQUENCE))
                }
            }
        }
        if column.not_null {
            parts.push(match dialect {
                Dialect::Redshift => "not null".to_string(),
                Dialect::DuckDb => "NOT NULL".to_string(),
            });
        }
        if dialect == Dialect::Redshift {
            if column.sort_key {
                parts.push("sortkey".to_string());
            }
            if column.dist_key {
                parts.push("distkey".to_string());
            }
        }

        parts.join(" ")
    }

    /// Names of a relation's columns, in DDL order
    pub fn column_names(relation: Relation) -> Vec<&'static str> {
        Self::table(relation).columns.iter().map(|c| c.name).collect()
    }

    /// Whether a relation needs a sequence in the given dialect
    pub fn needs_sequence(relation: Relation, dialect: Dialect) -> bool {
        dialect == Dialect::DuckDb && Self::table(relation).columns.iter().any(|c| c.identity)
    }
}
