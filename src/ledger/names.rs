//! Basename (ENS on Base) reverse resolution.

use anyhow::{Context, Result};
use async_trait::async_trait;
use ethers::core::abi::Token;
use ethers::utils::keccak256;
use tracing::debug;

use super::{abi, JsonRpcClient, NameResolver};
use crate::models::Address;

/// Base L2 resolver on mainnet.
pub const BASE_L2_RESOLVER: &str = "0xc6d566a56a1aff6508b41f6c90ff131615583bcd";

/// ENSIP-11 coin type for Base (`0x80000000 | 8453`).
pub const BASE_COIN_TYPE: u32 = 0x8000_0000 | 8453;

/// ENS namehash (EIP-137).
pub fn namehash(name: &str) -> [u8; 32] {
    let mut node = [0u8; 32];
    if name.is_empty() {
        return node;
    }
    for label in name.rsplit('.') {
        let mut buf = [0u8; 64];
        buf[..32].copy_from_slice(&node);
        buf[32..].copy_from_slice(&keccak256(label.as_bytes()));
        node = keccak256(&buf);
    }
    node
}

/// Reverse node `<addr>.<cointype>.reverse` for `address`.
pub fn reverse_node(address: &Address, coin_type: u32) -> [u8; 32] {
    namehash(&format!("{}.{:X}.reverse", address.hex_body(), coin_type))
}

/// Resolves primary Basenames via `name(bytes32)` on the L2 resolver.
pub struct BasenameResolver {
    rpc: JsonRpcClient,
    resolver: Address,
}

impl BasenameResolver {
    pub fn new(rpc: JsonRpcClient, resolver: Address) -> Self {
        Self { rpc, resolver }
    }
}

#[async_trait]
impl NameResolver for BasenameResolver {
    async fn resolve_name(&self, address: &Address) -> Result<Option<String>> {
        let node = reverse_node(address, BASE_COIN_TYPE);
        let data = abi::encode_call(abi::NAME, &[Token::FixedBytes(node.to_vec())]);
        let ret = self
            .rpc
            .eth_call(&self.resolver, data)
            .await
            .context("basename lookup failed")?;
        let name = abi::decode_name(&ret)?;
        debug!(address = %address, name = ?name, "basename resolved");
        Ok(name)
    }
}

/// Resolver used when name lookup is disabled.
pub struct NoNameResolver;

#[async_trait]
impl NameResolver for NoNameResolver {
    async fn resolve_name(&self, _address: &Address) -> Result<Option<String>> {
        Ok(None)
    }
}
