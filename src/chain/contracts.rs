//! Contract bindings for the Flare registry, the FAssets asset manager and the
//! wrapped-asset ERC-20.
//!
//! The ABI fragments are the wire contract this client speaks. They list only
//! the members the orchestrator calls; bump them together with the deployed
//! asset manager interface.

use ethers::contract::abigen;

abigen!(
    FlareContractRegistry,
    r#"[
        function getContractAddressByName(string _name) external view returns (address)
    ]"#
);

abigen!(
    AssetManager,
    r#"[
        struct AvailableAgentInfo { address agentVault; uint256 feeBIPS; uint256 freeCollateralLots; }
        struct AgentInfo { uint8 status; uint256 feeBIPS; }
        struct AssetManagerSettings { uint64 lotSizeAMG; uint8 assetDecimals; uint256 maxRedeemedTickets; }
        struct RedemptionTicketInfo { uint256 ticketValueUBA; }
        struct Proof { bytes32[] merkleProof; bytes data; }
        function getSettings() external view returns (AssetManagerSettings _settings)
        function fAsset() external view returns (address)
        function assetMintingDecimals() external view returns (uint256)
        function getAvailableAgentsDetailedList(uint256 _start, uint256 _end) external view returns (AvailableAgentInfo[] _agents, uint256 _totalLength)
        function getAgentInfo(address _agentVault) external view returns (AgentInfo _info)
        function collateralReservationFee(uint256 _lots) external view returns (uint256)
        function reserveCollateral(address _agentVault, uint256 _lots, uint256 _maxMintingFeeBIPS, address _executor) external payable returns (uint256)
        function executeMinting(Proof _proof, uint256 _collateralReservationId) external returns (uint256)
        function redeem(uint256 _lots, string _redeemerUnderlyingAddressString, address _executor) external payable returns (uint256)
        function redemptionQueue(uint256 _start, uint256 _end) external view returns (RedemptionTicketInfo[] _queue, uint256 _totalLength)
        event CollateralReserved(address indexed agentVault, address indexed minter, uint256 indexed collateralReservationId, uint256 valueUBA, uint256 feeUBA, uint256 firstUnderlyingBlock, uint256 lastUnderlyingBlock, uint256 lastUnderlyingTimestamp, string paymentAddress, bytes32 paymentReference, address executor, uint256 executorFeeNatWei)
        event MintingExecuted(address indexed agentVault, uint256 indexed collateralReservationId, uint256 mintedAmountUBA, uint256 agentFeeUBA, uint256 poolFeeUBA)
        event RedemptionRequested(address indexed agentVault, address indexed redeemer, uint256 indexed requestId, string paymentAddress, uint256 valueUBA, uint256 feeUBA, uint256 firstUnderlyingBlock, uint256 lastUnderlyingBlock, uint256 lastUnderlyingTimestamp, bytes32 paymentReference, address executor, uint256 executorFeeNatWei)
    ]"#
);

abigen!(
    WrappedAsset,
    r#"[
        function approve(address spender, uint256 amount) external returns (bool)
        function balanceOf(address account) external view returns (uint256)
    ]"#
);
