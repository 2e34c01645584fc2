//! Contract call surfaces consumed by the engine.
//!
//! Only the read methods the batcher prepares are declared here; calldata is
//! hand-dispatched per method, so no provider bindings are generated.

use alloy::sol;

sol! {
    interface IERC165 {
        function supportsInterface(bytes4 interfaceId) external view returns (bool);
    }

    interface IERC20Metadata {
        function name() external view returns (string);
        function symbol() external view returns (string);
        function decimals() external view returns (uint8);
        function totalSupply() external view returns (uint256);
        function balanceOf(address owner) external view returns (uint256);
    }

    interface IERC721 {
        function ownerOf(uint256 tokenId) external view returns (address);
        function tokenURI(uint256 tokenId) external view returns (string);
        function baseURI() external view returns (string);
    }

    interface IERC1155 {
        function balanceOf(address account, uint256 id) external view returns (uint256);
    }

    interface IContractMetadata {
        function contractURI() external view returns (string);
    }
}

/// `type(IERC165).interfaceId`.
pub const ERC165_INTERFACE_ID: [u8; 4] = [0x01, 0xff, 0xc9, 0xa7];
/// `type(IERC721).interfaceId`.
pub const ERC721_INTERFACE_ID: [u8; 4] = [0x80, 0xac, 0x58, 0xcd];
/// `type(IERC1155).interfaceId`.
pub const ERC1155_INTERFACE_ID: [u8; 4] = [0xd9, 0xb6, 0x7a, 0x26];
/// The id ERC-165 requires contracts to reject; a `true` answer marks a
/// broken responder.
pub const INVALID_INTERFACE_ID: [u8; 4] = [0xff, 0xff, 0xff, 0xff];
