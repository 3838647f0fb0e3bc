//! TestSnapshot builder: a temp directory holding an HPD registration snapshot
//!
//! Each registration covers one building (boro/block/lot); contacts hang off
//! registrations. The CLI runs against the snapshot with the temp directory
//! as its working directory.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use rusqlite::{params, Connection};
use tempfile::TempDir;

/// One registration contact row
#[derive(Debug, Clone)]
pub struct Contact {
    pub contact_type: String,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    pub corporationname: Option<String>,
    pub house_number: String,
    pub street_name: String,
    pub city: String,
    pub state: String,
}

impl Contact {
    /// Individual owner at a Brooklyn business address
    pub fn person(first: &str, last: &str, house: &str, street: &str) -> Self {
        Self {
            contact_type: "IndividualOwner".to_string(),
            firstname: Some(first.to_string()),
            lastname: Some(last.to_string()),
            corporationname: None,
            house_number: house.to_string(),
            street_name: street.to_string(),
            city: "BROOKLYN".to_string(),
            state: "NY".to_string(),
        }
    }

    /// Corporate owner at a Brooklyn business address
    pub fn corporation(name: &str, house: &str, street: &str) -> Self {
        Self {
            contact_type: "CorporateOwner".to_string(),
            firstname: None,
            lastname: None,
            corporationname: Some(name.to_string()),
            ..Self::person("", "", house, street)
        }
    }

    pub fn with_type(mut self, contact_type: &str) -> Self {
        self.contact_type = contact_type.to_string();
        self
    }
}

pub struct TestSnapshot {
    dir: TempDir,
    conn: Connection,
    next_contact_id: i64,
}

impl TestSnapshot {
    /// Create an empty snapshot at `<tempdir>/snapshot.db`
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let conn = Connection::open(dir.path().join("snapshot.db")).expect("Failed to open snapshot");
        conn.execute_batch(
            r#"
            CREATE TABLE hpd_registrations (
                registrationid INTEGER PRIMARY KEY,
                boroid INTEGER,
                block INTEGER,
                lot INTEGER,
                registrationenddate TEXT
            );
            CREATE TABLE hpd_contacts (
                registrationcontactid INTEGER PRIMARY KEY,
                registrationid INTEGER,
                type TEXT,
                firstname TEXT,
                lastname TEXT,
                corporationname TEXT,
                businesshousenumber TEXT,
                businessstreetname TEXT,
                businessapartment TEXT,
                businesscity TEXT,
                businessstate TEXT,
                businesszip TEXT
            );
            "#,
        )
        .expect("Failed to create snapshot schema");
        Self {
            dir,
            conn,
            next_contact_id: 1,
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn db_path(&self) -> PathBuf {
        self.dir.path().join("snapshot.db")
    }

    /// Path inside the temp directory, as a string for CLI args
    pub fn out(&self, name: &str) -> String {
        self.dir.path().join(name).to_string_lossy().to_string()
    }

    /// Add a registration for one building; `bbl` is the 10-digit padded BBL
    pub fn add_registration(&self, registration_id: i64, bbl: &str, end_date: &str) -> &Self {
        let boro: i64 = bbl[0..1].parse().expect("boro");
        let block: i64 = bbl[1..6].parse().expect("block");
        let lot: i64 = bbl[6..10].parse().expect("lot");
        self.conn
            .execute(
                "INSERT INTO hpd_registrations VALUES (?1, ?2, ?3, ?4, ?5)",
                params![registration_id, boro, block, lot, end_date],
            )
            .expect("Failed to insert registration");
        self
    }

    /// Add a contact to a registration; returns its contact id
    pub fn add_contact(&mut self, registration_id: i64, contact: &Contact) -> i64 {
        let id = self.next_contact_id;
        self.next_contact_id += 1;
        self.conn
            .execute(
                "INSERT INTO hpd_contacts VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, NULL, ?9, ?10, '11201')",
                params![
                    id,
                    registration_id,
                    contact.contact_type,
                    contact.firstname,
                    contact.lastname,
                    contact.corporationname,
                    contact.house_number,
                    contact.street_name,
                    contact.city,
                    contact.state,
                ],
            )
            .expect("Failed to insert contact");
        id
    }

    /// Registration plus a single contact
    pub fn add_building(&mut self, registration_id: i64, bbl: &str, contact: Contact) -> &mut Self {
        self.add_registration(registration_id, bbl, "2030-01-01");
        self.add_contact(registration_id, &contact);
        self
    }

    /// The LOBOT / LANDLORDO scenario:
    /// - reg 1: LOBOT JONES at 5 BESPIN AVE (3000010001)
    /// - reg 2: LANDLORDO CALRISSIAN at 5 BESPIN AVE (3000010002)
    /// - reg 3: LANDLORDO CALRISIAN at 700 SUPERSPUNKY AVE (3000010003)
    /// - reg 4: HAN SOLO at 1 MILLENNIUM WAY (1000010001)
    pub fn cloud_city() -> Self {
        let mut snap = Self::new();
        snap.add_building(1, "3000010001", Contact::person("LOBOT", "JONES", "5", "BESPIN AVE"))
            .add_building(
                2,
                "3000010002",
                Contact::person("LANDLORDO", "CALRISSIAN", "5", "BESPIN AVE"),
            )
            .add_building(
                3,
                "3000010003",
                Contact::person("LANDLORDO", "CALRISIAN", "700", "SUPERSPUNKY AVE"),
            )
            .add_building(4, "1000010001", Contact::person("HAN", "SOLO", "1", "MILLENNIUM WAY"));
        snap
    }

    /// Run raw SQL against the snapshot
    pub fn execute(&self, sql: &str) {
        self.conn.execute_batch(sql).expect("Failed to execute SQL");
    }

    /// Open the snapshot as a library source
    pub fn source(&self) -> portfoliograph::SqliteSnapshot {
        portfoliograph::SqliteSnapshot::new(self.db_path())
    }

    /// Run the portfoliograph binary
    pub fn run_cli(&self, args: &[&str]) -> std::io::Result<Output> {
        Command::new(env!("CARGO_BIN_EXE_portfoliograph"))
            .current_dir(self.path())
            .env_remove("RUST_LOG")
            .env_remove("PORTFOLIOGRAPH_CONFIG")
            .args(args)
            .output()
    }

    /// Run CLI and expect success, return stdout
    pub fn run_cli_success(&self, args: &[&str]) -> String {
        let output = self.run_cli(args).expect("Failed to run CLI");
        assert!(
            output.status.success(),
            "CLI command {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).to_string()
    }

    /// Run CLI and expect failure, return (exit code, stderr)
    pub fn run_cli_failure(&self, args: &[&str]) -> (Option<i32>, String) {
        let output = self.run_cli(args).expect("Failed to run CLI");
        assert!(
            !output.status.success(),
            "CLI command {:?} should have failed",
            args
        );
        (
            output.status.code(),
            String::from_utf8_lossy(&output.stderr).to_string(),
        )
    }

    /// Write a file into the temp directory
    pub fn add_file(&self, name: &str, content: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, content).expect("Failed to write file");
        path
    }
}
