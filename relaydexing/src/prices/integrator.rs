/// Marks the end of deposit calldata that carries an integrator tag
const INTEGRATOR_DELIMITER: [u8; 3] = [0x1d, 0xc0, 0xde];
const INTEGRATOR_ID_LENGTH: usize = 2;

/// Extracts the two-byte integrator id appended after the last delimiter
/// in a deposit's calldata, formatted as `0x`-prefixed hex.
pub fn get_integrator_id(calldata: &[u8]) -> Option<String> {
    let delimiter_start = calldata
        .windows(INTEGRATOR_DELIMITER.len())
        .rposition(|window| window == INTEGRATOR_DELIMITER)?;
    let id_start = delimiter_start + INTEGRATOR_DELIMITER.len();
    let integrator_id = calldata.get(id_start..id_start + INTEGRATOR_ID_LENGTH)?;

    Some(format!("0x{}", hex_string(integrator_id)))
}

fn hex_string(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}
