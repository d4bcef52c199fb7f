//! Chain access seam
//!
//! `BridgeClient` is the only surface through which the relayer touches a
//! chain: height polling, event fetching, root publication and transfer
//! submission. The production implementation speaks JSON-RPC over HTTP via
//! alloy; tests substitute an in-memory mock.

use alloy::network::EthereumWallet;
use alloy::primitives::{Address, FixedBytes, B256, U256};
use alloy::providers::{Provider, ProviderBuilder, RootProvider};
use alloy::rpc::types::{Filter, Log};
use alloy::signers::local::PrivateKeySigner;
use alloy::transports::http::{Client, Http};
use async_trait::async_trait;
use eyre::{eyre, Result, WrapErr};
use std::str::FromStr;

use crate::contracts::evm_bridge::TokenBridge;
use crate::types::{BridgeEvent, TransferId};

/// Async chain operations used by the watcher, aggregator and relay paths.
#[async_trait]
pub trait BridgeClient: Send + Sync {
    /// Chain name this client is bound to (for logging).
    fn chain_name(&self) -> &str;

    /// Current chain height.
    async fn block_number(&self) -> Result<u64>;

    /// All bridge contract events in `[from, to]`, decoded.
    async fn bridge_events(&self, from: u64, to: u64) -> Result<Vec<BridgeEvent>>;

    /// Submit `updateMerkleRoot(root)`. Returns the transaction hash.
    async fn update_merkle_root(&self, root: [u8; 32]) -> Result<String>;

    /// Submit `release(user, amount, proof, transferId)`.
    async fn release(
        &self,
        user: Address,
        amount: U256,
        proof: &[[u8; 32]],
        transfer_id: TransferId,
    ) -> Result<String>;

    /// Submit `unlock(user, amount, proof, transferId)`.
    async fn unlock(
        &self,
        user: Address,
        amount: U256,
        proof: &[[u8; 32]],
        transfer_id: TransferId,
    ) -> Result<String>;
}

/// Gas buffer applied on top of the node's estimate.
const GAS_BUFFER_PERCENT: u64 = 20;

/// alloy-backed client for one chain's bridge contract.
pub struct EvmBridgeClient {
    chain_name: String,
    rpc_url: String,
    provider: RootProvider<Http<Client>>,
    bridge_address: Address,
    signer: PrivateKeySigner,
}

impl EvmBridgeClient {
    pub fn new(chain_name: &str, rpc_url: &str, bridge_address: &str, private_key: &str) -> Result<Self> {
        let url = rpc_url.parse().wrap_err("Failed to parse RPC URL")?;
        let provider = ProviderBuilder::new().on_http(url);

        let bridge_address =
            Address::from_str(bridge_address).wrap_err("Invalid bridge address")?;
        let signer: PrivateKeySigner = private_key.parse().wrap_err("Invalid private key")?;

        Ok(Self {
            chain_name: chain_name.to_string(),
            rpc_url: rpc_url.to_string(),
            provider,
            bridge_address,
            signer,
        })
    }

    pub fn signer_address(&self) -> Address {
        self.signer.address()
    }

    /// Provider with the relayer's wallet attached, for submitting paths.
    fn wallet_provider(&self) -> Result<impl Provider<Http<Client>>> {
        let wallet = EthereumWallet::from(self.signer.clone());
        let url = self.rpc_url.parse().wrap_err("Invalid RPC URL")?;
        Ok(ProviderBuilder::new().wallet(wallet).on_http(url))
    }

    /// Decode a raw log into a typed event, or `None` for foreign events.
    fn decode_log(&self, log: &Log) -> Result<Option<BridgeEvent>> {
        let topics = log.topics();
        // Every bridge event carries exactly one indexed parameter (user).
        if topics.len() < 2 {
            return Ok(None);
        }

        let block_number = log
            .block_number
            .ok_or_else(|| eyre!("Missing block number on log"))?;

        // Indexed: topics[1] = user. Non-indexed data words follow the ABI.
        let user_from_topic = |topic: &B256| Address::from_slice(&topic.as_slice()[12..32]);
        let data = log.data().data.as_ref();
        let word = |i: usize| -> Result<&[u8]> {
            data.get(i * 32..(i + 1) * 32)
                .ok_or_else(|| eyre!("Log data truncated at word {}", i))
        };

        let event = if topics[0] == Self::locked_signature() {
            BridgeEvent::Locked {
                user: user_from_topic(&topics[1]),
                amount: U256::from_be_slice(word(0)?),
                nonce: u64_from_word(word(1)?)?,
                block_number,
            }
        } else if topics[0] == Self::burned_signature() {
            BridgeEvent::Burned {
                user: user_from_topic(&topics[1]),
                amount: U256::from_be_slice(word(0)?),
                nonce: u64_from_word(word(1)?)?,
                block_number,
            }
        } else if topics[0] == Self::released_signature() {
            BridgeEvent::Released {
                user: user_from_topic(&topics[1]),
                amount: U256::from_be_slice(word(0)?),
                transfer_id: transfer_id_from_word(word(1)?)?,
                block_number,
            }
        } else if topics[0] == Self::unlocked_signature() {
            BridgeEvent::Unlocked {
                user: user_from_topic(&topics[1]),
                amount: U256::from_be_slice(word(0)?),
                transfer_id: transfer_id_from_word(word(1)?)?,
                block_number,
            }
        } else {
            return Ok(None);
        };

        Ok(Some(event))
    }

    fn locked_signature() -> B256 {
        alloy::primitives::keccak256(b"Locked(address,uint256,uint256)")
    }

    fn burned_signature() -> B256 {
        alloy::primitives::keccak256(b"Burned(address,uint256,uint256)")
    }

    fn released_signature() -> B256 {
        alloy::primitives::keccak256(b"Released(address,uint256,bytes32)")
    }

    fn unlocked_signature() -> B256 {
        alloy::primitives::keccak256(b"Unlocked(address,uint256,bytes32)")
    }
}

fn u64_from_word(word: &[u8]) -> Result<u64> {
    let value = U256::from_be_slice(word);
    value
        .try_into()
        .map_err(|_| eyre!("Value does not fit in u64: {}", value))
}

fn transfer_id_from_word(word: &[u8]) -> Result<TransferId> {
    let arr: [u8; 32] = word
        .try_into()
        .map_err(|_| eyre!("transferId word is not 32 bytes"))?;
    Ok(TransferId(arr))
}

fn proof_words(proof: &[[u8; 32]]) -> Vec<FixedBytes<32>> {
    proof.iter().map(|h| FixedBytes::from(*h)).collect()
}

#[async_trait]
impl BridgeClient for EvmBridgeClient {
    fn chain_name(&self) -> &str {
        &self.chain_name
    }

    async fn block_number(&self) -> Result<u64> {
        self.provider
            .get_block_number()
            .await
            .wrap_err("Failed to get block number")
    }

    async fn bridge_events(&self, from: u64, to: u64) -> Result<Vec<BridgeEvent>> {
        let filter = Filter::new()
            .address(self.bridge_address)
            .from_block(from)
            .to_block(to);

        let logs = self
            .provider
            .get_logs(&filter)
            .await
            .wrap_err("Failed to get logs")?;

        let mut events = Vec::new();
        for log in logs {
            match self.decode_log(&log) {
                Ok(Some(event)) => events.push(event),
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(
                        chain = %self.chain_name,
                        tx_hash = ?log.transaction_hash,
                        log_index = ?log.log_index,
                        error = %e,
                        "Failed to decode bridge log"
                    );
                }
            }
        }
        Ok(events)
    }

    async fn update_merkle_root(&self, root: [u8; 32]) -> Result<String> {
        let provider = self.wallet_provider()?;
        let contract = TokenBridge::new(self.bridge_address, &provider);

        let call = contract.updateMerkleRoot(FixedBytes::from(root));
        let gas = call
            .estimate_gas()
            .await
            .wrap_err("Failed to estimate gas for updateMerkleRoot")?;
        let call = call.gas(gas + gas * GAS_BUFFER_PERCENT / 100);

        let pending_tx = call
            .send()
            .await
            .map_err(|e| eyre!("Failed to send updateMerkleRoot: {}", e))?;
        let tx_hash = *pending_tx.tx_hash();

        let receipt = pending_tx
            .get_receipt()
            .await
            .map_err(|e| eyre!("Failed to get receipt: {}", e))?;
        if !receipt.status() {
            return Err(eyre!("updateMerkleRoot transaction reverted"));
        }

        Ok(format!("0x{:x}", tx_hash))
    }

    async fn release(
        &self,
        user: Address,
        amount: U256,
        proof: &[[u8; 32]],
        transfer_id: TransferId,
    ) -> Result<String> {
        let provider = self.wallet_provider()?;
        let contract = TokenBridge::new(self.bridge_address, &provider);

        let call = contract.release(
            user,
            amount,
            proof_words(proof),
            FixedBytes::from(*transfer_id.as_bytes()),
        );
        let gas = call
            .estimate_gas()
            .await
            .wrap_err("Failed to estimate gas for release")?;
        let call = call.gas(gas + gas * GAS_BUFFER_PERCENT / 100);

        let pending_tx = call
            .send()
            .await
            .map_err(|e| eyre!("Failed to send release: {}", e))?;
        let tx_hash = *pending_tx.tx_hash();

        let receipt = pending_tx
            .get_receipt()
            .await
            .map_err(|e| eyre!("Failed to get receipt: {}", e))?;
        if !receipt.status() {
            return Err(eyre!("release transaction reverted"));
        }

        Ok(format!("0x{:x}", tx_hash))
    }

    async fn unlock(
        &self,
        user: Address,
        amount: U256,
        proof: &[[u8; 32]],
        transfer_id: TransferId,
    ) -> Result<String> {
        let provider = self.wallet_provider()?;
        let contract = TokenBridge::new(self.bridge_address, &provider);

        let call = contract.unlock(
            user,
            amount,
            proof_words(proof),
            FixedBytes::from(*transfer_id.as_bytes()),
        );
        let gas = call
            .estimate_gas()
            .await
            .wrap_err("Failed to estimate gas for unlock")?;
        let call = call.gas(gas + gas * GAS_BUFFER_PERCENT / 100);

        let pending_tx = call
            .send()
            .await
            .map_err(|e| eyre!("Failed to send unlock: {}", e))?;
        let tx_hash = *pending_tx.tx_hash();

        let receipt = pending_tx
            .get_receipt()
            .await
            .map_err(|e| eyre!("Failed to get receipt: {}", e))?;
        if !receipt.status() {
            return Err(eyre!("unlock transaction reverted"));
        }

        Ok(format!("0x{:x}", tx_hash))
    }
}
