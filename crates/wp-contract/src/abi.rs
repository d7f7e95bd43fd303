use alloy_primitives::{Address, B256, Bytes, U256};
use alloy_sol_types::{SolCall, SolEvent, sol};
use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;
use serde_json::Value;
use wp_api_types::RawWaveRecord;

sol! {
    #[derive(Debug, PartialEq, Eq)]
    struct Wave {
        address waver;
        string message;
        uint256 timestamp;
    }

    function getTotalWaves() external view returns (uint256);
    function getAllWaves() external view returns (Wave[] memory);
    function wave(string memory _message) external payable;

    #[derive(Debug, PartialEq, Eq)]
    event NewWave(address indexed from, uint256 timestamp, string message);
}

pub struct InterfaceDescription {
    pub name: &'static str,
    pub functions: &'static [&'static str],
    pub events: &'static [(&'static str, B256)],
}

impl InterfaceDescription {
    pub fn event_topic(&self, event_name: &str) -> Option<B256> {
        self.events
            .iter()
            .find(|(name, _)| *name == event_name)
            .map(|(_, topic)| *topic)
    }
}

pub static WAVE_PORTAL_INTERFACE: InterfaceDescription = InterfaceDescription {
    name: "WavePortal",
    functions: &[
        getTotalWavesCall::SIGNATURE,
        getAllWavesCall::SIGNATURE,
        waveCall::SIGNATURE,
    ],
    events: &[("NewWave", NewWave::SIGNATURE_HASH)],
};

#[derive(Debug, Deserialize)]
pub struct RpcLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
}

pub fn encode_total_waves() -> Vec<u8> {
    getTotalWavesCall {}.abi_encode()
}

pub fn encode_all_waves() -> Vec<u8> {
    getAllWavesCall {}.abi_encode()
}

pub fn encode_wave(message: &str) -> Vec<u8> {
    waveCall {
        _message: message.to_owned(),
    }
    .abi_encode()
}

pub fn decode_total_waves(output: &[u8]) -> Result<u64> {
    let total = getTotalWavesCall::abi_decode_returns(output, true)
        .context("getTotalWaves returned malformed data")?
        ._0;
    u64::try_from(total).map_err(|_| anyhow!("wave count {total} does not fit in u64"))
}

pub fn decode_all_waves(output: &[u8]) -> Result<Vec<RawWaveRecord>> {
    getAllWavesCall::abi_decode_returns(output, true)
        .context("getAllWaves returned malformed data")?
        ._0
        .into_iter()
        .map(|wave| raw_record(wave.waver, wave.timestamp, wave.message))
        .collect()
}

/// Decodes a `NewWave` log, checking that it was emitted by `contract`.
pub fn decode_new_wave(log: &Value, contract: Address) -> Result<RawWaveRecord> {
    let log: RpcLog = serde_json::from_value(log.clone()).context("malformed log object")?;
    if log.address != contract {
        bail!("log emitted by {} instead of {contract}", log.address);
    }

    let event = NewWave::decode_raw_log(log.topics.iter().copied(), &log.data, true)
        .context("log is not a NewWave event")?;
    raw_record(event.from, event.timestamp, event.message)
}

fn raw_record(waver: Address, timestamp: U256, message: String) -> Result<RawWaveRecord> {
    let timestamp =
        u64::try_from(timestamp).map_err(|_| anyhow!("timestamp {timestamp} does not fit in u64"))?;
    Ok(RawWaveRecord {
        waver: waver.to_checksum(None),
        timestamp,
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;
    use alloy_sol_types::SolValue;
    use serde_json::json;

    const CONTRACT: Address = address!("A0D8fEB6d62f92D3deeF0EE4d08fb25EBDD22bc8");

    #[test]
    fn all_waves_keep_contract_order_and_map_fields_by_name() {
        let waves = vec![
            Wave {
                waver: address!("00000000000000000000000000000000000000aa"),
                message: "hi".to_owned(),
                timestamp: U256::from(10),
            },
            Wave {
                waver: address!("00000000000000000000000000000000000000bb"),
                message: "yo".to_owned(),
                timestamp: U256::from(20),
            },
        ];
        let output = getAllWavesCall::abi_encode_returns(&(waves,));

        let decoded = decode_all_waves(&output).expect("decode");

        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].message, "hi");
        assert_eq!(decoded[0].timestamp, 10);
        assert_eq!(decoded[1].message, "yo");
        assert_eq!(decoded[1].timestamp, 20);
        assert_eq!(
            decoded[0].waver,
            address!("00000000000000000000000000000000000000aa").to_checksum(None)
        );
    }

    #[test]
    fn oversized_timestamp_is_rejected_not_truncated() {
        let waves = vec![Wave {
            waver: Address::ZERO,
            message: "far future".to_owned(),
            timestamp: U256::from(u64::MAX) + U256::from(1),
        }];
        let output = getAllWavesCall::abi_encode_returns(&(waves,));

        assert!(decode_all_waves(&output).is_err());
    }

    #[test]
    fn total_waves_decodes_single_word() {
        let output = U256::from(42).abi_encode();
        assert_eq!(decode_total_waves(&output).expect("decode"), 42);
        assert!(decode_total_waves(&[0x01, 0x02]).is_err());
    }

    #[test]
    fn new_wave_log_from_other_contract_is_ignored() {
        let event = NewWave {
            from: address!("00000000000000000000000000000000000000bb"),
            timestamp: U256::from(20),
            message: "yo".to_owned(),
        };
        let data = event.encode_log_data();
        let log = json!({
            "address": Address::ZERO,
            "topics": data.topics(),
            "data": data.data,
        });

        assert!(decode_new_wave(&log, CONTRACT).is_err());

        let log = json!({
            "address": CONTRACT,
            "topics": data.topics(),
            "data": data.data,
        });
        let raw = decode_new_wave(&log, CONTRACT).expect("decode");
        assert_eq!(raw.timestamp, 20);
        assert_eq!(raw.message, "yo");
    }

    #[test]
    fn interface_knows_new_wave_only() {
        assert_eq!(
            WAVE_PORTAL_INTERFACE.event_topic("NewWave"),
            Some(NewWave::SIGNATURE_HASH)
        );
        assert_eq!(WAVE_PORTAL_INTERFACE.event_topic("Transfer"), None);
        assert!(WAVE_PORTAL_INTERFACE.functions.contains(&"wave(string)"));
    }
}
