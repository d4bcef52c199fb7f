//! Bridge contract ABI definition
//!
//! Uses alloy's sol! macro to generate type-safe bindings for the on-chain
//! bridge contract. The contract is an external collaborator: lock/burn
//! escrow logic and duplicate-transfer rejection live there, not here.

use alloy::sol;

sol! {
    /// Token bridge contract surface consumed by the relayer
    #[sol(rpc)]
    contract TokenBridge {
        /// Commit the Merkle root covering the current pending transfer set.
        /// Called by the relayer after every rebuild.
        function updateMerkleRoot(bytes32 root) external;

        /// Mint/pay out a transfer that was locked on the counterpart chain.
        /// Reverts on an invalid proof or an already-processed transferId.
        function release(
            address user,
            uint256 amount,
            bytes32[] calldata proof,
            bytes32 transferId
        ) external;

        /// Free an original token whose wrapped form was burned on the
        /// counterpart chain. Same revert semantics as release.
        function unlock(
            address user,
            uint256 amount,
            bytes32[] calldata proof,
            bytes32 transferId
        ) external;

        /// The currently committed Merkle root.
        function merkleRoot() external view returns (bytes32);

        /// Events
        event Locked(address indexed user, uint256 amount, uint256 nonce);

        event Burned(address indexed user, uint256 amount, uint256 nonce);

        event Released(address indexed user, uint256 amount, bytes32 transferId);

        event Unlocked(address indexed user, uint256 amount, bytes32 transferId);
    }
}
