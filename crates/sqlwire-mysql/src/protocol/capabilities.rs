//! Capability flags (client and server).
//!
//! The lower 32 bits are the classic MySQL flags. Bit 0 doubles as the
//! "MySQL server" marker in MariaDB handshakes: when it is clear, the server
//! sends MariaDB extended capabilities in bits 32..63.

pub const CLIENT_MYSQL: u64 = 1;
pub const CLIENT_FOUND_ROWS: u64 = 1 << 1;
pub const CLIENT_LONG_FLAG: u64 = 1 << 2;
pub const CLIENT_CONNECT_WITH_DB: u64 = 1 << 3;
pub const CLIENT_NO_SCHEMA: u64 = 1 << 4;
pub const CLIENT_COMPRESS: u64 = 1 << 5;
pub const CLIENT_ODBC: u64 = 1 << 6;
pub const CLIENT_LOCAL_FILES: u64 = 1 << 7;
pub const CLIENT_IGNORE_SPACE: u64 = 1 << 8;
pub const CLIENT_PROTOCOL_41: u64 = 1 << 9;
pub const CLIENT_INTERACTIVE: u64 = 1 << 10;
pub const CLIENT_SSL: u64 = 1 << 11;
pub const CLIENT_IGNORE_SIGPIPE: u64 = 1 << 12;
pub const CLIENT_TRANSACTIONS: u64 = 1 << 13;
pub const CLIENT_RESERVED: u64 = 1 << 14;
pub const CLIENT_SECURE_CONNECTION: u64 = 1 << 15;
pub const CLIENT_MULTI_STATEMENTS: u64 = 1 << 16;
pub const CLIENT_MULTI_RESULTS: u64 = 1 << 17;
pub const CLIENT_PS_MULTI_RESULTS: u64 = 1 << 18;
pub const CLIENT_PLUGIN_AUTH: u64 = 1 << 19;
pub const CLIENT_CONNECT_ATTRS: u64 = 1 << 20;
pub const CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA: u64 = 1 << 21;
pub const CLIENT_CAN_HANDLE_EXPIRED_PASSWORDS: u64 = 1 << 22;
pub const CLIENT_SESSION_TRACK: u64 = 1 << 23;
pub const CLIENT_DEPRECATE_EOF: u64 = 1 << 24;
pub const CLIENT_SSL_VERIFY_SERVER_CERT: u64 = 1 << 30;

/* MariaDB extended capabilities */
pub const MARIADB_CLIENT_PROGRESS: u64 = 1 << 32;
pub const MARIADB_CLIENT_COM_MULTI: u64 = 1 << 33;
pub const MARIADB_CLIENT_STMT_BULK_OPERATIONS: u64 = 1 << 34;
pub const MARIADB_CLIENT_EXTENDED_TYPE_INFO: u64 = 1 << 35;
pub const MARIADB_CLIENT_CACHE_METADATA: u64 = 1 << 36;

/// Capabilities this client always offers.
pub const DEFAULT_CLIENT_FLAGS: u64 = CLIENT_FOUND_ROWS
    | CLIENT_IGNORE_SPACE
    | CLIENT_PROTOCOL_41
    | CLIENT_TRANSACTIONS
    | CLIENT_SECURE_CONNECTION
    | CLIENT_MULTI_RESULTS
    | CLIENT_PS_MULTI_RESULTS
    | CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA
    | CLIENT_SESSION_TRACK
    | CLIENT_DEPRECATE_EOF;

/// Check whether `flag` is set in `mask`.
#[inline]
pub const fn has(mask: u64, flag: u64) -> bool {
    mask & flag != 0
}

/// Compute the client capability mask for a connection.
///
/// `PLUGIN_AUTH` is echoed when the server offers it; `CONNECT_WITH_DB` only
/// when a database is configured and the server offers it.
pub fn negotiate(server: u64, database: Option<&str>) -> u64 {
    let mut client = DEFAULT_CLIENT_FLAGS;

    if has(server, CLIENT_PLUGIN_AUTH) {
        client |= CLIENT_PLUGIN_AUTH;
    }

    let wants_db = database.is_some_and(|db| !db.is_empty());
    if wants_db && has(server, CLIENT_CONNECT_WITH_DB) {
        client |= CLIENT_CONNECT_WITH_DB;
    }

    client
}

/// Names of the flags set in `mask`, lowest bit first.
pub fn describe(mask: u64) -> Vec<&'static str> {
    const NAMES: &[(u64, &str)] = &[
        (CLIENT_MYSQL, "MYSQL"),
        (CLIENT_FOUND_ROWS, "FOUND_ROWS"),
        (CLIENT_LONG_FLAG, "LONG_FLAG"),
        (CLIENT_CONNECT_WITH_DB, "CONNECT_WITH_DB"),
        (CLIENT_NO_SCHEMA, "NO_SCHEMA"),
        (CLIENT_COMPRESS, "COMPRESS"),
        (CLIENT_ODBC, "ODBC"),
        (CLIENT_LOCAL_FILES, "LOCAL_FILES"),
        (CLIENT_IGNORE_SPACE, "IGNORE_SPACE"),
        (CLIENT_PROTOCOL_41, "PROTOCOL_41"),
        (CLIENT_INTERACTIVE, "INTERACTIVE"),
        (CLIENT_SSL, "SSL"),
        (CLIENT_IGNORE_SIGPIPE, "IGNORE_SIGPIPE"),
        (CLIENT_TRANSACTIONS, "TRANSACTIONS"),
        (CLIENT_RESERVED, "RESERVED"),
        (CLIENT_SECURE_CONNECTION, "SECURE_CONNECTION"),
        (CLIENT_MULTI_STATEMENTS, "MULTI_STATEMENTS"),
        (CLIENT_MULTI_RESULTS, "MULTI_RESULTS"),
        (CLIENT_PS_MULTI_RESULTS, "PS_MULTI_RESULTS"),
        (CLIENT_PLUGIN_AUTH, "PLUGIN_AUTH"),
        (CLIENT_CONNECT_ATTRS, "CONNECT_ATTRS"),
        (
            CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA,
            "PLUGIN_AUTH_LENENC_CLIENT_DATA",
        ),
        (
            CLIENT_CAN_HANDLE_EXPIRED_PASSWORDS,
            "CAN_HANDLE_EXPIRED_PASSWORDS",
        ),
        (CLIENT_SESSION_TRACK, "SESSION_TRACK"),
        (CLIENT_DEPRECATE_EOF, "DEPRECATE_EOF"),
        (CLIENT_SSL_VERIFY_SERVER_CERT, "SSL_VERIFY_SERVER_CERT"),
        (MARIADB_CLIENT_PROGRESS, "MARIADB_CLIENT_PROGRESS"),
        (MARIADB_CLIENT_COM_MULTI, "MARIADB_CLIENT_COM_MULTI"),
        (
            MARIADB_CLIENT_STMT_BULK_OPERATIONS,
            "MARIADB_CLIENT_STMT_BULK_OPERATIONS",
        ),
        (
            MARIADB_CLIENT_EXTENDED_TYPE_INFO,
            "MARIADB_CLIENT_EXTENDED_TYPE_INFO",
        ),
        (MARIADB_CLIENT_CACHE_METADATA, "MARIADB_CLIENT_CACHE_METADATA"),
    ];

    NAMES
        .iter()
        .filter(|(flag, _)| has(mask, *flag))
        .map(|(_, name)| *name)
        .collect()
}
