//! Synthetic collision files for end-to-end tests.

use std::io::Write;

use tempfile::NamedTempFile;

pub const HEADER: &str = concat!(
    "C_YEAR,C_MNTH,C_WDAY,C_HOUR,C_SEV,C_VEHS,C_CONF,C_RCFG,C_WTHR,C_RSUR,C_RALN,C_TRAF,",
    "V_ID,V_TYPE,V_YEAR,P_ID,P_SEX,P_AGE,P_PSN,P_ISEV,P_SAFE,P_USER"
);

/// One collision: its date and location plus one `(vehicle_year, sex, injury)` per unit.
pub struct Collision {
    pub year: u16,
    pub month: u8,
    pub location: u8,
    pub fatal: bool,
    pub units: Vec<(u16, char, u8)>,
}

impl Collision {
    fn lines(&self, out: &mut Vec<u8>) {
        let severity = if self.fatal { 1 } else { 2 };
        for (i, &(vehicle_year, sex, injury)) in self.units.iter().enumerate() {
            let vehicle_year = match vehicle_year {
                0 => "UUUU".to_string(),
                year => year.to_string(),
            };
            let line = format!(
                "{},{:02},4,08,{},{:02},21,{:02},1,1,1,18,{:02},06,{},01,{},40,11,{},02,1\r\n",
                self.year,
                self.month,
                severity,
                self.units.len(),
                self.location,
                i + 1,
                vehicle_year,
                sex,
                injury,
            );
            assert_eq!(line.len(), 63, "bad fixture line {line}");
            out.extend_from_slice(line.as_bytes());
        }
    }
}

pub fn write_file(collisions: &[Collision]) -> NamedTempFile {
    assert_eq!(HEADER.len(), 145);
    let mut bytes = format!("{HEADER}\r\n").into_bytes();
    for c in collisions {
        c.lines(&mut bytes);
    }
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(&bytes).unwrap();
    file.flush().unwrap();
    file
}

/// Unit `u` of collision `i` in [`mixed`].
fn unit(i: usize, u: usize) -> (u16, char, u8) {
    let k = i + u;
    let vehicle_year = match k % 6 {
        0 => 0,
        _ => 1985 + (k % 30) as u16,
    };
    let sex = ['M', 'F', 'U'][k % 3];
    let injury = match (i % 9, u) {
        (0, 0) => 3,
        _ => 1 + (k % 2) as u8,
    };
    (vehicle_year, sex, injury)
}

/// A deterministic mix of collisions: varied sizes, months, locations and outcomes.
pub fn mixed(count: usize) -> Vec<Collision> {
    (0..count)
        .map(|i| {
            let size = 1 + (i * 7) % 5;
            Collision {
                year: 1999 + (i % 14) as u16,
                month: if i % 17 == 0 { 0 } else { (i % 12) as u8 + 1 },
                location: (i % 13) as u8,
                fatal: i % 9 == 0,
                units: (0..size).map(|u| unit(i, u)).collect(),
            }
        })
        .collect()
}
