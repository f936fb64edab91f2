use alloy::sol;

sol! {
    #[sol(rpc)]
    interface IComptroller {
        function getAllMarkets() external view returns (address[] memory);
        function oracle() external view returns (address);
    }

    #[sol(rpc)]
    interface ICToken {
        function totalSupply() external view returns (uint256);
        function totalBorrows() external view returns (uint256);
        function exchangeRateStored() external view returns (uint256);
        function supplyRatePerBlock() external view returns (uint256);
        function borrowRatePerBlock() external view returns (uint256);
    }

    // Only token-backed markets implement this. The native market does not.
    #[sol(rpc)]
    interface ICErc20 {
        function underlying() external view returns (address);
    }

    #[sol(rpc)]
    interface IPriceOracle {
        // Price scaled by `1e(36 - underlying decimals)`.
        function getUnderlyingPrice(address cToken) external view returns (uint256);
    }

    #[sol(rpc)]
    interface IERC20Metadata {
        function name() external view returns (string memory);
        function symbol() external view returns (string memory);
        function decimals() external view returns (uint8);
    }
}
