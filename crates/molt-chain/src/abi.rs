//! MoodMint contract bindings.

use alloy::sol;

sol! {
    #[allow(missing_docs)]
    #[sol(rpc)]
    #[derive(Debug)]
    interface MoodMint {
        event DailyMint(address indexed agent, uint256 indexed tokenId, string metadataUri, uint256 timestamp);

        function mintDaily(address to, string metadataUri) external returns (uint256);
        function timeUntilNextMint(address agent) external view returns (uint256);
        function getAgentTimeline(address agent) external view returns (uint256[]);
        function tokenURI(uint256 tokenId) external view returns (string);
        function ownerOf(uint256 tokenId) external view returns (address);
    }
}
