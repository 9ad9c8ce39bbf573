#![allow(dead_code)]

use std::path::{Path, PathBuf};

use rusqlite::{Connection, params};
use tempfile::{TempDir, tempdir};

pub const PLAN_ROWS: &[(&str, &str, &str, i64, f64)] = &[
    // (계획년월, 매출처명, 품명, 판매수량, 판매금액)
    ("2024-01-01", "가나상사", "볼펜", 100, 150000.0),
    ("2024-01-01", "다라무역", "노트", 40, 80000.0),
    ("2024-02-01", "가나상사", "볼펜", 120, 180000.0),
];

pub const ACTUAL_ROWS: &[(&str, &str, &str, i64, f64)] = &[
    // (매출일, 매출처명, 품목명, 수량, 장부금액)
    ("2024-01-05", "가나상사", "볼펜", 60, 90000.0),
    ("2024-01-28 14:30:00", "가나상사", "볼펜", 30, 45000.0),
    ("2024-02-11", "다라무역", "노트", 25, 50000.0),
    ("2024-03-02", "마바산업", "지우개", 10, 5000.0),
];

/// Scratch directory holding a sample sales database.
pub struct SalesFixture {
    dir: TempDir,
    pub db: PathBuf,
}

impl SalesFixture {
    pub fn new() -> Self {
        let dir = tempdir().expect("temp dir");
        let db = dir.path().join("sales.db");
        let conn = Connection::open(&db).expect("create sales db");
        create_sales_tables(&conn);
        Self { dir, db }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }
}

pub fn create_sales_tables(conn: &Connection) {
    conn.execute_batch(
        "CREATE TABLE sales_plan_data (
            계획년월 TEXT, 매출처 TEXT, 매출처명 TEXT, 품목코드 TEXT, 품명 TEXT,
            거래통화 TEXT, 환율 REAL, 판매단가 REAL, 판매수량 INTEGER, 판매금액 REAL,
            대분류 TEXT, 중분류 TEXT, 소분류 TEXT
        );
        CREATE TABLE sales_actual_data (
            매출일 TEXT, 매출처 TEXT, 매출처명 TEXT, 품목 TEXT, 품목명 TEXT,
            거래통화 TEXT, 환율 REAL, 판매단가 REAL, 수량 INTEGER, 장부금액 REAL,
            대분류 TEXT, 중분류 TEXT, 소분류 TEXT
        );",
    )
    .expect("create sales tables");

    for (idx, (month, customer, item, qty, amount)) in PLAN_ROWS.iter().enumerate() {
        conn.execute(
            "INSERT INTO sales_plan_data VALUES (?1, ?2, ?3, ?4, ?5, 'KRW', 1.0, ?6, ?7, ?8, '문구', '필기', '기타')",
            params![
                month,
                format!("C{idx:03}"),
                customer,
                format!("P{idx:03}"),
                item,
                amount / *qty as f64,
                qty,
                amount
            ],
        )
        .expect("insert plan row");
    }
    for (idx, (date, customer, item, qty, amount)) in ACTUAL_ROWS.iter().enumerate() {
        conn.execute(
            "INSERT INTO sales_actual_data VALUES (?1, ?2, ?3, ?4, ?5, 'KRW', 1.0, ?6, ?7, ?8, '문구', '필기', '기타')",
            params![
                date,
                format!("C{idx:03}"),
                customer,
                format!("P{idx:03}"),
                item,
                amount / *qty as f64,
                qty,
                amount
            ],
        )
        .expect("insert actual row");
    }
}
